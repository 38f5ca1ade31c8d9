//! lnwatch node - reaches the LND REST interface through the Tor SOCKS proxy.
//!
//! Layers, bottom up:
//! - [`circuit`]: NEWNYM/SIGHUP circuit refresh with one shared cooldown clock
//! - [`transport`]: proxied HTTP with a bounded retry-after-refresh policy
//! - [`client`]: typed node operations returning `Option<Value>`

pub mod circuit;
pub mod client;
pub mod transport;

pub use circuit::{CircuitRefresher, RefreshReason};
pub use client::{NodeApi, NodeClient};
pub use transport::{ProxyTransport, RetryDecision, RetryPolicy, TransportError};
