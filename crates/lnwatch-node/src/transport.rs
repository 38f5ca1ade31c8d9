//! HTTP transport to the node through the Tor SOCKS proxy.

use crate::circuit::{CircuitRefresher, RefreshReason};
use lnwatch_core::config::{MonitorConfig, NodeConfig, TorConfig};
use reqwest::{Method, Proxy, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Header LND reads the hex macaroon from.
pub const MACAROON_HEADER: &str = "Grpc-Metadata-macaroon";

/// Failure talking to the node.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("macaroon rejected by node (HTTP 401)")]
    Unauthorized,

    #[error("node responded with status {0}")]
    Status(u16),

    #[error("invalid JSON from node: {0}")]
    Decode(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("could not build HTTP client: {0}")]
    Client(String),
}

impl TransportError {
    /// Whether the failure may clear up on its own. A rejected credential
    /// or a broken client setup will not.
    pub fn is_transient(&self) -> bool {
        !matches!(self, TransportError::Unauthorized | TransportError::Client(_))
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Refresh circuits, then send the request again.
    RefreshAndRetry,
    /// Return the failure to the caller.
    GiveUp,
}

/// Bounded retry policy: at most `max_retries` extra attempts, each only
/// after a timeout or connection failure and only when a circuit refresh is
/// due.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 1 }
    }
}

impl RetryPolicy {
    pub fn decide(&self, retries_done: u32, err: &TransportError, refresh_due: bool) -> RetryDecision {
        if retries_done >= self.max_retries || !refresh_due {
            return RetryDecision::GiveUp;
        }
        match err {
            TransportError::Timeout | TransportError::Connect(_) => RetryDecision::RefreshAndRetry,
            _ => RetryDecision::GiveUp,
        }
    }
}

/// Build a reqwest client routed through the SOCKS proxy.
///
/// Certificate verification is off: LND serves a self-signed certificate
/// and the onion address already authenticates the endpoint.
pub fn build_proxy_client(
    proxy_url: &str,
    connect_timeout: Duration,
    request_timeout: Duration,
) -> Result<reqwest::Client, TransportError> {
    let proxy = Proxy::all(proxy_url).map_err(|e| TransportError::Client(e.to_string()))?;
    reqwest::Client::builder()
        .proxy(proxy)
        .danger_accept_invalid_certs(true)
        .connect_timeout(connect_timeout)
        .timeout(request_timeout)
        .pool_idle_timeout(Duration::from_secs(45))
        .build()
        .map_err(|e| TransportError::Client(e.to_string()))
}

/// Check that the proxy can reach the Tor network at all.
pub async fn probe_proxy(client: &reqwest::Client, check_url: &str) -> Result<(), TransportError> {
    let response = client
        .get(check_url)
        .timeout(Duration::from_secs(15))
        .send()
        .await
        .map_err(TransportError::from_reqwest)?;
    if response.status().is_success() {
        Ok(())
    } else {
        Err(TransportError::Status(response.status().as_u16()))
    }
}

/// Sends authenticated JSON requests to the node.
pub struct ProxyTransport {
    client: reqwest::Client,
    base_url: String,
    macaroon_hex: String,
    circuit: Arc<CircuitRefresher>,
    policy: RetryPolicy,
}

impl ProxyTransport {
    pub fn new(
        node: &NodeConfig,
        tor: &TorConfig,
        monitor: &MonitorConfig,
        circuit: Arc<CircuitRefresher>,
    ) -> Result<Self, TransportError> {
        let client = build_proxy_client(
            &tor.proxy_url(),
            monitor.connect_timeout,
            monitor.request_timeout,
        )?;
        Ok(Self::with_client(
            client,
            node.base_url(),
            node.macaroon_hex.clone(),
            circuit,
        ))
    }

    /// Use a preconfigured client, e.g. one without a proxy.
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        macaroon_hex: impl Into<String>,
        circuit: Arc<CircuitRefresher>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            macaroon_hex: macaroon_hex.into(),
            circuit,
            policy: RetryPolicy::default(),
        }
    }

    pub fn circuit(&self) -> &Arc<CircuitRefresher> {
        &self.circuit
    }

    /// Send a request to `endpoint` (a path under the base URL) and decode
    /// the JSON response.
    pub async fn request(
        &self,
        endpoint: &str,
        method: Method,
        body: Option<&Value>,
    ) -> Result<Value, TransportError> {
        let mut retries = 0;
        loop {
            let err = match self.send_once(endpoint, &method, body).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match self.policy.decide(retries, &err, self.circuit.is_due()) {
                RetryDecision::RefreshAndRetry => {
                    warn!(endpoint = %endpoint, attempt = retries + 1, "{}, retrying after circuit refresh", err);
                    self.circuit.refresh(RefreshReason::Transport).await;
                    retries += 1;
                }
                RetryDecision::GiveUp => {
                    match &err {
                        TransportError::Unauthorized => error!(endpoint = %endpoint, "Invalid or expired macaroon"),
                        TransportError::Timeout => warn!(endpoint = %endpoint, "Timeout in node connection"),
                        TransportError::Connect(e) => warn!(endpoint = %endpoint, "Node connection error: {}", e),
                        TransportError::Status(code) => {
                            warn!(endpoint = %endpoint, "Node responds with status code: {}", code)
                        }
                        other if other.is_transient() => {
                            warn!(endpoint = %endpoint, "Error in node request: {}", other)
                        }
                        other => error!(endpoint = %endpoint, "Node request cannot succeed: {}", other),
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn send_once(
        &self,
        endpoint: &str,
        method: &Method,
        body: Option<&Value>,
    ) -> Result<Value, TransportError> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!(method = %method, url = %url, "Sending node request");

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(MACAROON_HEADER, &self.macaroon_hex);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(TransportError::from_reqwest)?;
        match response.status() {
            StatusCode::OK => response
                .json::<Value>()
                .await
                .map_err(TransportError::from_reqwest),
            StatusCode::UNAUTHORIZED => Err(TransportError::Unauthorized),
            status => Err(TransportError::Status(status.as_u16())),
        }
    }
}
