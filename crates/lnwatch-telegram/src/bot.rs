//! Telegram Bot API client: outbound messages and long-polled updates.

use async_trait::async_trait;
use lnwatch_core::config::TelegramConfig;
use lnwatch_core::{CommandSource, InboundMessage, NotifyError, Notifier};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Telegram rejects messages longer than this many characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Commands advertised in the bot menu.
pub const COMMANDS: &[(&str, &str)] = &[
    ("help", "List available commands"),
    ("info", "Node alias, version, block height and sync status"),
    ("balance", "On-chain and channel balances"),
    ("channels", "Channel counts, balances and largest channels"),
    ("peers", "Connected peers"),
    ("fees", "Routing fees earned over the last 30 days"),
];

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Offset that acknowledges every update in `updates`.
pub fn next_offset(updates: &[Update]) -> Option<i64> {
    updates.iter().map(|u| u.update_id + 1).max()
}

/// Text messages carried by `updates`.
pub fn to_inbound(updates: Vec<Update>) -> Vec<InboundMessage> {
    updates
        .into_iter()
        .filter_map(|u| {
            let message = u.message?;
            Some(InboundMessage {
                update_id: u.update_id,
                chat_id: message.chat.id,
                text: message.text?,
            })
        })
        .collect()
}

/// Body and parse mode for one outgoing message.
///
/// Text over the length limit goes out as clipped plain text: a cut can
/// land inside a tag or entity, which Telegram rejects in HTML mode.
pub fn prepare_message(text: &str) -> (String, Option<&'static str>) {
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        return (text.to_string(), Some("HTML"));
    }
    let plain = strip_html(text);
    if plain.chars().count() <= MAX_MESSAGE_CHARS {
        return (plain, None);
    }
    let mut clipped: String = plain.chars().take(MAX_MESSAGE_CHARS - 1).collect();
    clipped.push('…');
    (clipped, None)
}

/// Remove tags and decode the entities produced by `report::escape_html`.
pub fn strip_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

/// Bot bound to the single operator chat.
pub struct TelegramBot {
    http: reqwest::Client,
    endpoint: String,
    chat_id: i64,
    offset: AtomicI64,
    poll_timeout: Duration,
}

impl TelegramBot {
    pub fn new(config: &TelegramConfig) -> Result<Self, NotifyError> {
        Self::with_poll_timeout(config, Duration::from_secs(30))
    }

    pub fn with_poll_timeout(config: &TelegramConfig, poll_timeout: Duration) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder()
            .timeout(poll_timeout + Duration::from_secs(10))
            .build()
            .map_err(|e| NotifyError::Http(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: format!("{}/bot{}", config.api_url, config.bot_token),
            chat_id: config.chat_id,
            offset: AtomicI64::new(0),
            poll_timeout,
        })
    }

    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &Value) -> Result<T, NotifyError> {
        let response = self
            .http
            .post(format!("{}/{}", self.endpoint, method))
            .json(body)
            .send()
            .await
            // reqwest includes the URL, and with it the bot token, in its errors.
            .map_err(|e| NotifyError::Http(e.without_url().to_string()))?;

        let status = response.status().as_u16();
        let parsed: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| NotifyError::Decode(e.without_url().to_string()))?;

        if !parsed.ok {
            return Err(NotifyError::Rejected {
                status: parsed.error_code.unwrap_or(status),
                description: parsed.description.unwrap_or_else(|| "no description".into()),
            });
        }
        parsed
            .result
            .ok_or_else(|| NotifyError::Decode(format!("{} returned no result", method)))
    }

    /// Send `text` into `chat_id`, as HTML when it fits in one message.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), NotifyError> {
        let (text, parse_mode) = prepare_message(text);
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
            "disable_web_page_preview": true,
        });
        if let Some(mode) = parse_mode {
            body["parse_mode"] = json!(mode);
        }
        self.call::<Value>("sendMessage", &body).await?;
        info!(chat_id, "Telegram message sent successfully");
        Ok(())
    }

    /// Register the command menu shown by Telegram clients.
    pub async fn register_commands(&self) -> Result<(), NotifyError> {
        let commands: Vec<Value> = COMMANDS
            .iter()
            .map(|(command, description)| json!({"command": command, "description": description}))
            .collect();
        self.call::<bool>("setMyCommands", &json!({ "commands": commands }))
            .await?;
        Ok(())
    }

    async fn get_updates(&self, timeout: Duration) -> Result<Vec<Update>, NotifyError> {
        let body = json!({
            "offset": self.offset.load(Ordering::SeqCst),
            "timeout": timeout.as_secs(),
            "allowed_updates": ["message"],
        });
        let updates: Vec<Update> = self.call("getUpdates", &body).await?;
        if let Some(offset) = next_offset(&updates) {
            self.offset.store(offset, Ordering::SeqCst);
        }
        Ok(updates)
    }
}

#[async_trait]
impl Notifier for TelegramBot {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        self.send_message(self.chat_id, text).await
    }
}

#[async_trait]
impl CommandSource for TelegramBot {
    async fn drain_backlog(&self) -> Result<usize, NotifyError> {
        // getUpdates returns at most 100 updates; keep confirming until the
        // queue comes back empty.
        let mut dropped = 0;
        loop {
            let updates = self.get_updates(Duration::ZERO).await?;
            if updates.is_empty() {
                break;
            }
            dropped += updates.len();
        }
        debug!(offset = self.offset.load(Ordering::SeqCst), "Update backlog drained");
        Ok(dropped)
    }

    async fn next_batch(&self) -> Result<Vec<InboundMessage>, NotifyError> {
        let updates = self.get_updates(self.poll_timeout).await?;
        Ok(to_inbound(updates))
    }

    async fn reply(&self, chat_id: i64, text: &str) -> Result<(), NotifyError> {
        if chat_id != self.chat_id {
            warn!(chat_id, "Replying outside the operator chat");
        }
        self.send_message(chat_id, text).await
    }
}
