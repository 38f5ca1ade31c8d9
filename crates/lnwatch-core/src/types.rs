//! Common types used across lnwatch crates.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The result of one successful `getinfo` poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub alias: String,
    pub version: String,
    pub block_height: Option<u64>,
    pub synced_to_chain: bool,
    pub synced_to_graph: bool,
    pub num_active_channels: u64,
    pub identity_pubkey: String,
    pub num_peers: u64,
    pub num_pending_channels: u64,
}

impl NodeSnapshot {
    /// Build a snapshot from an LND `getinfo` payload.
    ///
    /// Missing fields fall back to placeholders rather than failing, so a
    /// node that answers with a partial payload still counts as online.
    pub fn from_json(info: &Value) -> Self {
        let text = |key: &str| {
            info.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .unwrap_or("N/A")
                .to_string()
        };
        let count = |key: &str| info.get(key).and_then(value_u64).unwrap_or(0);
        let flag = |key: &str| info.get(key).and_then(Value::as_bool).unwrap_or(false);

        Self {
            alias: text("alias"),
            version: text("version"),
            block_height: info.get("block_height").and_then(value_u64),
            synced_to_chain: flag("synced_to_chain"),
            synced_to_graph: flag("synced_to_graph"),
            num_active_channels: count("num_active_channels"),
            identity_pubkey: text("identity_pubkey"),
            num_peers: count("num_peers"),
            num_pending_channels: count("num_pending_channels"),
        }
    }
}

/// An inbound text message from the chat transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub update_id: i64,
    pub chat_id: i64,
    pub text: String,
}

/// Read an unsigned integer that LND may encode either as a JSON number or
/// as a decimal string (its REST gateway renders uint64 fields as strings).
pub fn value_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Like [`value_u64`], but for fields that can be negative.
pub fn value_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
