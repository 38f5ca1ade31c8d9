//! lnwatch core - shared configuration, types and report formatting for the
//! Lightning node monitor.

pub mod config;
pub mod error;
pub mod notifier;
pub mod report;
pub mod tracing_setup;
pub mod types;

pub use config::Config;
pub use error::{ConfigError, NotifyError, ReportError};
pub use notifier::{CommandSource, Notifier};
pub use types::{InboundMessage, NodeSnapshot};
