//! Renders node payloads into operator-facing summaries.
//!
//! Every function here is pure: payload in, HTML-flavoured text out. The
//! `*Summary` types hold the computed aggregates so they can be checked
//! without comparing rendered strings.

use crate::error::ReportError;
use crate::types::{value_i64, value_u64, NodeSnapshot};
use chrono::{DateTime, Local, TimeZone};
use serde_json::Value;
use std::time::Duration;

/// Number of channels listed in the channel report.
pub const TOP_CHANNELS: usize = 3;
/// Number of peers listed in the peer report.
pub const MAX_PEERS_SHOWN: usize = 8;
/// Number of forwarding events listed in the fee report.
pub const RECENT_FORWARDS: usize = 5;
/// Trailing window covered by the fee report.
pub const FEE_WINDOW_DAYS: i64 = 30;

const ALIAS_WIDTH: usize = 20;
const ADDRESS_WIDTH: usize = 25;

/// Format a satoshi amount with unit scaling.
///
/// ```
/// use lnwatch_core::report::format_satoshis;
/// assert_eq!(format_satoshis(999), "999 sats");
/// assert_eq!(format_satoshis(1500), "1.5k sats (1,500)");
/// ```
pub fn format_satoshis(sats: u64) -> String {
    // Scale by the rounded value so 999,950 reads as 1.00M, not 1000.0k.
    let kilo = (sats as f64 / 100.0).round() / 10.0;
    let mega = (sats as f64 / 10_000.0).round() / 100.0;
    if sats < 1_000 {
        format!("{} sats", sats)
    } else if kilo < 1_000.0 {
        format!("{:.1}k sats ({})", kilo, group_thousands(sats))
    } else if mega < 100.0 {
        format!("{:.2}M sats ({})", mega, group_thousands(sats))
    } else {
        format!(
            "{}.{:08} BTC ({} sats)",
            sats / 100_000_000,
            sats % 100_000_000,
            group_thousands(sats)
        )
    }
}

/// Insert a comma between every group of three digits.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Human-readable span such as `2d 4h`, `1h 05m` or `3m 20s`.
pub fn format_duration(span: Duration) -> String {
    let secs = span.as_secs();
    let (days, hours, minutes, seconds) =
        (secs / 86_400, (secs % 86_400) / 3_600, (secs % 3_600) / 60, secs % 60);
    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {:02}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let head: String = text.chars().take(width.saturating_sub(1)).collect();
        format!("{}…", head)
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

fn field_array<'a>(payload: &'a Value, key: &'static str) -> Result<&'a Vec<Value>, ReportError> {
    match payload.get(key) {
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(ReportError::WrongType(key)),
        None => Err(ReportError::MissingField(key)),
    }
}

// LND omits repeated fields entirely when they are empty.
fn optional_array<'a>(payload: &'a Value, key: &'static str) -> Result<&'a [Value], ReportError> {
    match payload.get(key) {
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(Value::Null) | None => Ok(&[]),
        Some(_) => Err(ReportError::WrongType(key)),
    }
}

fn require_object(payload: &Value, name: &'static str) -> Result<(), ReportError> {
    if payload.is_object() {
        Ok(())
    } else {
        Err(ReportError::WrongType(name))
    }
}

fn sats(payload: &Value, key: &str) -> u64 {
    payload.get(key).and_then(value_u64).unwrap_or(0)
}

// Newer LND versions report channel balances as `{ "sat": .., "msat": .. }`.
fn amount_sats(payload: &Value, key: &str) -> Option<u64> {
    match payload.get(key)? {
        Value::Object(amount) => amount
            .get("sat")
            .and_then(value_u64)
            .or_else(|| amount.get("msat").and_then(value_u64).map(|m| m / 1_000)),
        other => value_u64(other),
    }
}

/// Short status block used in `/info` and recovery notifications.
pub fn node_summary(node: &NodeSnapshot) -> String {
    let status_icon = if node.synced_to_chain { "🟢" } else { "🟡" };
    let block = node
        .block_height
        .map(|h| h.to_string())
        .unwrap_or_else(|| "N/A".into());
    format!(
        "{} <b>LND Node Online</b>\n\
         📛 Alias: {}\n\
         🔧 Version: {}\n\
         📊 Block: {}\n\
         ⚡ Active channels: {}\n\
         🔗 Synced: {}",
        status_icon,
        escape_html(&node.alias),
        escape_html(&node.version),
        block,
        node.num_active_channels,
        yes_no(node.synced_to_chain),
    )
}

/// Full `/info` reply: the summary plus identity and peer counts.
pub fn info_report(node: &NodeSnapshot) -> String {
    format!(
        "{}\n🪪 Pubkey: <code>{}</code>\n👥 Peers: {}\n⏳ Pending channels: {}\n🕸️ Graph synced: {}",
        node_summary(node),
        escape_html(&node.identity_pubkey),
        node.num_peers,
        node.num_pending_channels,
        yes_no(node.synced_to_graph),
    )
}

/// On-chain plus channel balances.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceSummary {
    pub onchain_total: u64,
    pub onchain_confirmed: u64,
    pub onchain_unconfirmed: u64,
    pub channel_local: u64,
    pub channel_remote: u64,
    pub channel_pending_open: u64,
}

impl BalanceSummary {
    /// Combine `/v1/balance/blockchain` and `/v1/balance/channels` payloads.
    pub fn from_json(wallet: &Value, channels: &Value) -> Result<Self, ReportError> {
        require_object(wallet, "wallet_balance")?;
        require_object(channels, "channel_balance")?;

        let onchain_confirmed = sats(wallet, "confirmed_balance");
        let onchain_unconfirmed = sats(wallet, "unconfirmed_balance");
        let onchain_total = wallet
            .get("total_balance")
            .and_then(value_u64)
            .unwrap_or(onchain_confirmed + onchain_unconfirmed);

        Ok(Self {
            onchain_total,
            onchain_confirmed,
            onchain_unconfirmed,
            channel_local: amount_sats(channels, "local_balance")
                .or_else(|| amount_sats(channels, "balance"))
                .unwrap_or(0),
            channel_remote: amount_sats(channels, "remote_balance").unwrap_or(0),
            channel_pending_open: amount_sats(channels, "pending_open_local_balance")
                .or_else(|| amount_sats(channels, "pending_open_balance"))
                .unwrap_or(0),
        })
    }

    /// Funds the node controls: on-chain plus local channel side.
    pub fn total_owned(&self) -> u64 {
        self.onchain_total + self.channel_local
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "💰 <b>Balance</b>\n\n\
             ⛓️ <b>On-chain</b>\n\
             Total: {}\n\
             Confirmed: {}\n",
            format_satoshis(self.onchain_total),
            format_satoshis(self.onchain_confirmed),
        );
        if self.onchain_unconfirmed > 0 {
            out.push_str(&format!(
                "Unconfirmed: {}\n",
                format_satoshis(self.onchain_unconfirmed)
            ));
        }
        out.push_str(&format!(
            "\n⚡ <b>Lightning</b>\n\
             Local: {}\n\
             Remote: {}\n",
            format_satoshis(self.channel_local),
            format_satoshis(self.channel_remote),
        ));
        if self.channel_pending_open > 0 {
            out.push_str(&format!(
                "Pending open: {}\n",
                format_satoshis(self.channel_pending_open)
            ));
        }
        out.push_str(&format!(
            "\n📦 <b>Total owned:</b> {}",
            format_satoshis(self.total_owned())
        ));
        out
    }
}

/// One channel as listed in the channel report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelLine {
    pub alias: String,
    pub capacity: u64,
    pub local: u64,
    pub remote: u64,
    pub active: bool,
}

/// Aggregates over the channel list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelSummary {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub pending: usize,
    pub capacity: u64,
    pub local: u64,
    pub remote: u64,
    pub top: Vec<ChannelLine>,
}

impl ChannelSummary {
    /// Build from `/v1/channels` and, when available, `/v1/channels/pending`.
    pub fn from_json(list: &Value, pending: Option<&Value>) -> Result<Self, ReportError> {
        let channels = field_array(list, "channels")?;

        let mut lines: Vec<ChannelLine> = channels
            .iter()
            .map(|c| {
                let alias = c
                    .get("peer_alias")
                    .and_then(Value::as_str)
                    .filter(|a| !a.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| {
                        let key = c.get("remote_pubkey").and_then(Value::as_str).unwrap_or("?");
                        key.chars().take(12).collect()
                    });
                ChannelLine {
                    alias,
                    capacity: sats(c, "capacity"),
                    local: sats(c, "local_balance"),
                    remote: sats(c, "remote_balance"),
                    active: c.get("active").and_then(Value::as_bool).unwrap_or(false),
                }
            })
            .collect();

        let online = lines.iter().filter(|l| l.active).count();
        let mut summary = Self {
            total: lines.len(),
            online,
            offline: lines.len() - online,
            pending: 0,
            capacity: lines.iter().map(|l| l.capacity).sum(),
            local: lines.iter().map(|l| l.local).sum(),
            remote: lines.iter().map(|l| l.remote).sum(),
            top: Vec::new(),
        };

        if let Some(pending) = pending {
            for key in [
                "pending_open_channels",
                "pending_closing_channels",
                "pending_force_closing_channels",
                "waiting_close_channels",
            ] {
                summary.pending += optional_array(pending, key)?.len();
            }
        }

        lines.sort_by(|a, b| b.capacity.cmp(&a.capacity));
        lines.truncate(TOP_CHANNELS);
        summary.top = lines;
        Ok(summary)
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "⚡ <b>Channels</b>\n\n\
             Active: {} (🟢 {} online / 🔴 {} offline)\n\
             Pending: {}\n\
             Capacity: {}\n\
             Local: {}\n\
             Remote: {}\n",
            self.total,
            self.online,
            self.offline,
            self.pending,
            format_satoshis(self.capacity),
            format_satoshis(self.local),
            format_satoshis(self.remote),
        );
        if !self.top.is_empty() {
            out.push_str("\n🏆 <b>Largest channels</b>\n");
            for line in &self.top {
                let glyph = if line.active { "🟢" } else { "🔴" };
                out.push_str(&format!(
                    "{} {}: {}\n",
                    glyph,
                    escape_html(&truncate(&line.alias, ALIAS_WIDTH)),
                    format_satoshis(line.capacity),
                ));
            }
        }
        out.trim_end().to_string()
    }
}

/// One connected peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerLine {
    pub pubkey: String,
    pub address: String,
    pub inbound: bool,
}

/// Connected peers, as listed in the peer report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerSummary {
    pub count: usize,
    pub synced_to_graph: Option<bool>,
    pub shown: Vec<PeerLine>,
}

impl PeerSummary {
    /// Build from `/v1/peers`; the graph flag comes from `getinfo`.
    pub fn from_json(peers: &Value, synced_to_graph: Option<bool>) -> Result<Self, ReportError> {
        require_object(peers, "peers")?;
        let all = optional_array(peers, "peers")?;
        let shown = all
            .iter()
            .take(MAX_PEERS_SHOWN)
            .map(|p| PeerLine {
                pubkey: p
                    .get("pub_key")
                    .and_then(Value::as_str)
                    .unwrap_or("?")
                    .to_string(),
                address: p
                    .get("address")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
                inbound: p.get("inbound").and_then(Value::as_bool).unwrap_or(false),
            })
            .collect();
        Ok(Self {
            count: all.len(),
            synced_to_graph,
            shown,
        })
    }

    pub fn render(&self) -> String {
        let mut out = format!("👥 <b>Peers</b>\n\nConnected: {}\n", self.count);
        if let Some(synced) = self.synced_to_graph {
            out.push_str(&format!("🕸️ Graph synced: {}\n", yes_no(synced)));
        }
        if !self.shown.is_empty() {
            out.push('\n');
        }
        for peer in &self.shown {
            let marker = if peer.inbound { "⬅️ in" } else { "➡️ out" };
            let key: String = peer.pubkey.chars().take(10).collect();
            out.push_str(&format!(
                "{} <code>{}</code> {}\n",
                marker,
                escape_html(&key),
                escape_html(&shorten_address(&peer.address)),
            ));
        }
        if self.count > self.shown.len() {
            out.push_str(&format!("… and {} more\n", self.count - self.shown.len()));
        }
        out.trim_end().to_string()
    }
}

/// Shorten a peer address for display.
///
/// Hidden-service hosts keep their first 8 characters and the port; other
/// addresses are truncated.
pub fn shorten_address(address: &str) -> String {
    if address.is_empty() {
        return "(no address)".into();
    }
    let (host, port) = match address.rsplit_once(':') {
        Some((h, p)) if !h.is_empty() && p.chars().all(|c| c.is_ascii_digit()) => (h, Some(p)),
        _ => (address, None),
    };
    if let Some(name) = host.strip_suffix(".onion") {
        let head: String = name.chars().take(8).collect();
        match port {
            Some(port) => format!("{}….onion:{}", head, port),
            None => format!("{}….onion", head),
        }
    } else {
        truncate(address, ADDRESS_WIDTH)
    }
}

/// One routed payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardLine {
    pub timestamp: i64,
    pub fee_msat: u64,
    pub amt_out_msat: u64,
}

/// Routing income over the trailing window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeeSummary {
    pub total_fee_sats: u64,
    pub event_count: usize,
    pub average_fee_sats: u64,
    pub total_volume_sats: u64,
    pub recent: Vec<ForwardLine>,
}

impl FeeSummary {
    /// Build from a `/v1/switch` forwarding-history payload.
    pub fn from_json(history: &Value) -> Result<Self, ReportError> {
        require_object(history, "forwarding_history")?;
        let events = optional_array(history, "forwarding_events")?;

        let mut lines: Vec<ForwardLine> = events
            .iter()
            .map(|e| ForwardLine {
                timestamp: e.get("timestamp").and_then(value_i64).unwrap_or(0),
                fee_msat: e
                    .get("fee_msat")
                    .and_then(value_u64)
                    .or_else(|| e.get("fee").and_then(value_u64).map(|s| s * 1_000))
                    .unwrap_or(0),
                amt_out_msat: e
                    .get("amt_out_msat")
                    .and_then(value_u64)
                    .or_else(|| e.get("amt_out").and_then(value_u64).map(|s| s * 1_000))
                    .unwrap_or(0),
            })
            .collect();

        let total_fee_sats = lines.iter().map(|l| l.fee_msat).sum::<u64>() / 1_000;
        let total_volume_sats = lines.iter().map(|l| l.amt_out_msat).sum::<u64>() / 1_000;
        let event_count = lines.len();
        let average_fee_sats = if event_count == 0 {
            0
        } else {
            total_fee_sats / event_count as u64
        };

        lines.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        lines.truncate(RECENT_FORWARDS);

        Ok(Self {
            total_fee_sats,
            event_count,
            average_fee_sats,
            total_volume_sats,
            recent: lines,
        })
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "💸 <b>Routing fees ({} days)</b>\n\n\
             Earned: {}\n\
             Forwards: {}\n\
             Average fee: {}\n\
             Volume: {}\n",
            FEE_WINDOW_DAYS,
            format_satoshis(self.total_fee_sats),
            self.event_count,
            format_satoshis(self.average_fee_sats),
            format_satoshis(self.total_volume_sats),
        );
        if self.recent.is_empty() {
            out.push_str("\nNo forwards in this period.");
            return out;
        }
        out.push_str("\n🕐 <b>Recent forwards</b>\n");
        for line in &self.recent {
            let when = Local
                .timestamp_opt(line.timestamp, 0)
                .single()
                .map(|t: DateTime<Local>| t.format("%d/%m %H:%M").to_string())
                .unwrap_or_else(|| "?".into());
            out.push_str(&format!(
                "• {}: {} (fee {})\n",
                when,
                format_satoshis(line.amt_out_msat / 1_000),
                format_satoshis(line.fee_msat / 1_000),
            ));
        }
        out.trim_end().to_string()
    }
}

/// Reply used when a payload cannot be summarised.
pub fn degraded(report: &str, err: &ReportError) -> String {
    format!(
        "⚠️ Could not read {} data from the node ({}).",
        report,
        escape_html(&err.to_string())
    )
}
