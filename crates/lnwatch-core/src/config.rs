//! Environment-sourced configuration for every lnwatch role.

use crate::error::ConfigError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::env;
use std::time::Duration;
use tracing::warn;

/// Configuration for the Telegram bot transport.
#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: i64,
    pub api_url: String,
}

impl TelegramConfig {
    fn from_lookup<F>(get: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            bot_token: required(get, "TELEGRAM_BOT_TOKEN")?,
            chat_id: parse_required(get, "TELEGRAM_CHAT_ID")?,
            api_url: get("TELEGRAM_API_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| "https://api.telegram.org".into()),
        })
    }
}

/// Configuration for the monitored LND node.
#[derive(Clone)]
pub struct NodeConfig {
    pub onion_host: String,
    pub port: u16,
    /// Read-only macaroon, hex-encoded for the `Grpc-Metadata-macaroon` header.
    pub macaroon_hex: String,
}

impl NodeConfig {
    fn from_lookup<F>(get: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let macaroon = get("LND_MACAROON_RO").ok_or(ConfigError::Missing("LND_MACAROON_RO"))?;
        Ok(Self {
            onion_host: required(get, "LND_NODE_ONION_ADDRESS")?,
            port: parse_or(get, "LND_NODE_PORT", 8080)?,
            macaroon_hex: decode_macaroon(&macaroon)?,
        })
    }

    /// Base URL of the node's REST interface.
    pub fn base_url(&self) -> String {
        format!("https://{}:{}", self.onion_host, self.port)
    }
}

// The macaroon is a bearer credential; keep it out of debug output.
impl std::fmt::Debug for NodeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeConfig")
            .field("onion_host", &self.onion_host)
            .field("port", &self.port)
            .field("macaroon_hex", &"<redacted>")
            .finish()
    }
}

/// Configuration for the local Tor daemon.
#[derive(Clone, Debug)]
pub struct TorConfig {
    /// SOCKS5 proxy in `host:port` form.
    pub socks_proxy: String,
    /// Control port used for NEWNYM. `None` disables the control-port mechanism.
    pub control_addr: Option<String>,
    pub control_password: Option<String>,
    /// Fall back to sending SIGHUP to the `tor` process.
    pub signal_fallback: bool,
    pub refresh_interval: Duration,
    pub settle_delay: Duration,
    pub check_url: String,
}

impl TorConfig {
    fn from_lookup<F>(get: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let control_addr = match get("TOR_CONTROL_ADDR") {
            Some(addr) if addr.eq_ignore_ascii_case("none") || addr.is_empty() => None,
            Some(addr) => Some(addr),
            None => Some("127.0.0.1:9051".into()),
        };

        Ok(Self {
            socks_proxy: get("TOR_PROXY").unwrap_or_else(|| "127.0.0.1:9050".into()),
            control_addr,
            control_password: get("TOR_CONTROL_PASSWORD").filter(|p| !p.is_empty()),
            signal_fallback: parse_or(get, "TOR_SIGNAL_FALLBACK", true)?,
            refresh_interval: secs_or(get, "CIRCUIT_REFRESH_INTERVAL", 300)?,
            settle_delay: secs_or(get, "CIRCUIT_SETTLE_DELAY", 5)?,
            check_url: get("TOR_CHECK_URL")
                .unwrap_or_else(|| "http://check.torproject.org/api/ip".into()),
        })
    }

    /// Proxy URL with remote DNS resolution, required for `.onion` hosts.
    pub fn proxy_url(&self) -> String {
        format!("socks5h://{}", self.socks_proxy)
    }
}

/// Configuration for the status monitor and request timeouts.
#[derive(Clone, Debug)]
pub struct MonitorConfig {
    pub check_interval: Duration,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub failure_threshold: u32,
    pub error_backoff: Duration,
}

impl MonitorConfig {
    fn from_lookup<F>(get: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let check_interval = secs_or(get, "CHECK_INTERVAL", 120)?;
        let request_timeout = secs_or(get, "TIMEOUT", 30)?;
        let connect_timeout = secs_or(get, "CONNECT_TIMEOUT", 15)?;
        let failure_threshold: u32 = parse_or(get, "MAX_RETRIES", 3)?;

        if check_interval.is_zero() {
            return Err(ConfigError::invalid("CHECK_INTERVAL", "must be greater than zero"));
        }
        if request_timeout.is_zero() {
            return Err(ConfigError::invalid("TIMEOUT", "must be greater than zero"));
        }
        if failure_threshold == 0 {
            return Err(ConfigError::invalid("MAX_RETRIES", "must be at least 1"));
        }

        if connect_timeout > request_timeout {
            warn!(
                connect = ?connect_timeout,
                total = ?request_timeout,
                "CONNECT_TIMEOUT exceeds TIMEOUT, clamping"
            );
        }

        Ok(Self {
            check_interval,
            request_timeout,
            connect_timeout: connect_timeout.min(request_timeout),
            failure_threshold,
            error_backoff: secs_or(get, "ERROR_BACKOFF", 60)?,
        })
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(120),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(15),
            failure_threshold: 3,
            error_backoff: Duration::from_secs(60),
        }
    }
}

/// Combined configuration for the agent.
#[derive(Clone, Debug)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub node: NodeConfig,
    pub tor: TorConfig,
    pub monitor: MonitorConfig,
    pub log_file: Option<String>,
}

impl Config {
    /// Create full configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            telegram: TelegramConfig::from_lookup(&get)?,
            node: NodeConfig::from_lookup(&get)?,
            tor: TorConfig::from_lookup(&get)?,
            monitor: MonitorConfig::from_lookup(&get)?,
            log_file: get("LOG_FILE").filter(|p| !p.is_empty()),
        })
    }
}

/// Decode a base64 macaroon into the hex form LND expects in its header.
pub fn decode_macaroon(encoded: &str) -> Result<String, ConfigError> {
    let cleaned: String = encoded.split_whitespace().collect();
    let bytes = STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|e| ConfigError::Macaroon(e.to_string()))?;
    if bytes.is_empty() {
        return Err(ConfigError::Macaroon("decoded macaroon is empty".into()));
    }
    Ok(hex::encode(bytes))
}

fn required<F>(get: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    get(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn parse_required<F, T>(get: &F, key: &'static str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = required(get, key)?;
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(key, e.to_string()))
}

fn parse_or<F, T>(get: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(key, e.to_string())),
        _ => Ok(default),
    }
}

fn secs_or<F>(get: &F, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(get, key, default).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, String> {
        HashMap::from([
            ("TELEGRAM_BOT_TOKEN", "123:abc".to_string()),
            ("TELEGRAM_CHAT_ID", "424242".to_string()),
            ("LND_NODE_ONION_ADDRESS", "examplenode.onion".to_string()),
            // "AgEDbG5k" is base64 for 02 01 03 6c 6e 64
            ("LND_MACAROON_RO", "AgEDbG5k".to_string()),
        ])
    }

    fn load(env: &HashMap<&'static str, String>) -> Result<Config, ConfigError> {
        Config::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn test_defaults_applied() {
        let config = load(&base_env()).unwrap();
        assert_eq!(config.node.port, 8080);
        assert_eq!(config.node.macaroon_hex, "0201036c6e64");
        assert_eq!(config.telegram.chat_id, 424242);
        assert_eq!(config.monitor.check_interval, Duration::from_secs(120));
        assert_eq!(config.monitor.failure_threshold, 3);
        assert_eq!(config.tor.refresh_interval, Duration::from_secs(300));
        assert_eq!(config.tor.proxy_url(), "socks5h://127.0.0.1:9050");
        assert_eq!(config.tor.control_addr.as_deref(), Some("127.0.0.1:9051"));
        assert_eq!(config.node.base_url(), "https://examplenode.onion:8080");
    }

    #[test]
    fn test_missing_macaroon_is_fatal() {
        let mut env = base_env();
        env.remove("LND_MACAROON_RO");
        assert!(matches!(load(&env), Err(ConfigError::Missing("LND_MACAROON_RO"))));
    }

    #[test]
    fn test_malformed_macaroon_is_fatal() {
        let mut env = base_env();
        env.insert("LND_MACAROON_RO", "not base64 !!".to_string());
        assert!(matches!(load(&env), Err(ConfigError::Macaroon(_))));
    }

    #[test]
    fn test_invalid_chat_id() {
        let mut env = base_env();
        env.insert("TELEGRAM_CHAT_ID", "@operator".to_string());
        assert!(matches!(
            load(&env),
            Err(ConfigError::Invalid { key: "TELEGRAM_CHAT_ID", .. })
        ));
    }

    #[test]
    fn test_connect_timeout_clamped_to_total() {
        let mut env = base_env();
        env.insert("TIMEOUT", "10".to_string());
        env.insert("CONNECT_TIMEOUT", "20".to_string());
        let config = load(&env).unwrap();
        assert_eq!(config.monitor.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let mut env = base_env();
        env.insert("MAX_RETRIES", "0".to_string());
        assert!(load(&env).is_err());
    }

    #[test]
    fn test_control_port_can_be_disabled() {
        let mut env = base_env();
        env.insert("TOR_CONTROL_ADDR", "none".to_string());
        let config = load(&env).unwrap();
        assert!(config.tor.control_addr.is_none());
    }

    #[test]
    fn test_node_config_debug_redacts_macaroon() {
        let config = load(&base_env()).unwrap();
        let debug = format!("{:?}", config.node);
        assert!(!debug.contains("0201036c6e64"));
        assert!(debug.contains("redacted"));
    }
}
