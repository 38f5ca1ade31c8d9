//! Boundary to the operator-facing chat transport.

use crate::error::NotifyError;
use crate::types::InboundMessage;
use async_trait::async_trait;

/// Delivers formatted messages to the single configured operator.
///
/// Message bodies use the transport's HTML subset (`<b>`, `<code>`).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str) -> Result<(), NotifyError>;
}

/// Supplies inbound operator messages and sends direct replies.
#[async_trait]
pub trait CommandSource: Send + Sync {
    /// Discard every message that arrived before the listener started.
    /// Returns how many were dropped.
    async fn drain_backlog(&self) -> Result<usize, NotifyError>;

    /// Wait for the next batch of inbound messages. May return an empty
    /// batch when the poll window elapses without traffic.
    async fn next_batch(&self) -> Result<Vec<InboundMessage>, NotifyError>;

    /// Reply into the chat a message came from.
    async fn reply(&self, chat_id: i64, text: &str) -> Result<(), NotifyError>;
}
