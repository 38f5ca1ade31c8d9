//! Error types shared across lnwatch crates.
//!
//! ```text
//!   ConfigError   ◄── fatal at startup, process exits
//!   NotifyError   ◄── message delivery failed, logged by the caller
//!   ReportError   ◄── payload had an unexpected shape, degraded reply
//! ```
//!
//! Transport failures live in `lnwatch-node` next to the HTTP client.

use thiserror::Error;

/// Missing or malformed configuration. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} is required")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("error decoding macaroon: {0}")]
    Macaroon(String),
}

impl ConfigError {
    pub fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Failure delivering a message to, or receiving updates from, the operator.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notifier request failed: {0}")]
    Http(String),

    #[error("notifier rejected request ({status}): {description}")]
    Rejected { status: u16, description: String },

    #[error("unexpected notifier response: {0}")]
    Decode(String),
}

/// Node payload did not have the shape a report expects.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("field `{0}` has an unexpected type")]
    WrongType(&'static str),
}
