//! Typed LND REST operations.

use crate::transport::ProxyTransport;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;

/// Days of forwarding history requested by [`NodeApi::forwarding_history`].
pub const FORWARDING_LOOKBACK_DAYS: i64 = 30;
/// Maximum number of forwarding events requested.
pub const FORWARDING_MAX_EVENTS: u32 = 100;

/// Read-only node operations. Each returns the JSON payload on success and
/// `None` on any failure; the transport has already logged the cause.
#[async_trait]
pub trait NodeApi: Send + Sync {
    async fn get_info(&self) -> Option<Value>;
    async fn wallet_balance(&self) -> Option<Value>;
    async fn channel_balance(&self) -> Option<Value>;
    async fn list_channels(&self) -> Option<Value>;
    async fn pending_channels(&self) -> Option<Value>;
    async fn list_peers(&self) -> Option<Value>;
    async fn forwarding_history(&self) -> Option<Value>;
}

/// [`NodeApi`] over the proxied REST transport.
pub struct NodeClient {
    transport: ProxyTransport,
}

impl NodeClient {
    pub fn new(transport: ProxyTransport) -> Self {
        Self { transport }
    }

    async fn get(&self, endpoint: &str) -> Option<Value> {
        self.transport.request(endpoint, Method::GET, None).await.ok()
    }
}

/// Body of a `/v1/switch` request covering the trailing lookback window.
pub fn forwarding_request(now_unix: i64) -> Value {
    let start = now_unix - FORWARDING_LOOKBACK_DAYS * 24 * 60 * 60;
    json!({
        "start_time": start.to_string(),
        "end_time": now_unix.to_string(),
        "num_max_events": FORWARDING_MAX_EVENTS,
    })
}

#[async_trait]
impl NodeApi for NodeClient {
    async fn get_info(&self) -> Option<Value> {
        self.get("/v1/getinfo").await
    }

    async fn wallet_balance(&self) -> Option<Value> {
        self.get("/v1/balance/blockchain").await
    }

    async fn channel_balance(&self) -> Option<Value> {
        self.get("/v1/balance/channels").await
    }

    async fn list_channels(&self) -> Option<Value> {
        self.get("/v1/channels?peer_alias_lookup=true").await
    }

    async fn pending_channels(&self) -> Option<Value> {
        self.get("/v1/channels/pending").await
    }

    async fn list_peers(&self) -> Option<Value> {
        self.get("/v1/peers").await
    }

    async fn forwarding_history(&self) -> Option<Value> {
        let body = forwarding_request(Utc::now().timestamp());
        debug!(body = %body, "Requesting forwarding history");
        self.transport
            .request("/v1/switch", Method::POST, Some(&body))
            .await
            .ok()
    }
}
