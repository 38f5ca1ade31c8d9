//! Notification bodies sent by the monitor.

use chrono::{DateTime, Local};
use lnwatch_core::report::{escape_html, format_duration, node_summary};
use lnwatch_core::NodeSnapshot;
use std::time::Duration;

const STAMP: &str = "%d/%m/%Y %H:%M:%S";

pub fn startup(node_host: &str, interval: Duration, proxy: &str) -> String {
    format!(
        "🚀 <b>LND Monitor Started</b>\n\
         🎯 Node: <code>{}</code>\n\
         ⏱️ Interval: {}s\n\
         🔧 Proxy: socks5h://{}",
        escape_html(node_host),
        interval.as_secs(),
        escape_html(proxy),
    )
}

pub fn initial_online(now: DateTime<Local>, node: &NodeSnapshot) -> String {
    format!(
        "✅ <b>Node reachable</b>\n⏰ {}\n\n{}",
        now.format(STAMP),
        node_summary(node)
    )
}

pub fn back_online(now: DateTime<Local>, downtime: Duration, node: &NodeSnapshot) -> String {
    format!(
        "✅ <b>Node BACK ONLINE!</b>\n⏰ {}\n⌛ Downtime: {}\n\n{}",
        now.format(STAMP),
        format_duration(downtime),
        node_summary(node)
    )
}

pub fn offline(now: DateTime<Local>, last_success: DateTime<Local>, failures: u32) -> String {
    format!(
        "🚨 <b>NODE OFFLINE!</b>\n\
         ⏰ {}\n\
         ❌ Last successful check: {}\n\
         🔄 Failed attempts: {}",
        now.format(STAMP),
        last_success.format("%H:%M:%S"),
        failures,
    )
}

pub fn stopped() -> String {
    "🛑 <b>LND Monitor stopped</b>".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_offline_message_fields() {
        let now = Local.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap();
        let last = Local.with_ymd_and_hms(2026, 3, 14, 9, 24, 5).unwrap();
        let text = offline(now, last, 3);
        assert!(text.contains("14/03/2026 09:30:00"));
        assert!(text.contains("Last successful check: 09:24:05"));
        assert!(text.contains("Failed attempts: 3"));
    }

    #[test]
    fn test_back_online_includes_downtime_and_summary() {
        let now = Local.with_ymd_and_hms(2026, 3, 14, 10, 0, 0).unwrap();
        let node = NodeSnapshot::from_json(&serde_json::json!({"alias": "my-node"}));
        let text = back_online(now, Duration::from_secs(3_900), &node);
        assert!(text.contains("BACK ONLINE"));
        assert!(text.contains("Downtime: 1h 05m"));
        assert!(text.contains("Alias: my-node"));
    }

    #[test]
    fn test_startup_escapes_host() {
        let text = startup("a<b>.onion", Duration::from_secs(120), "127.0.0.1:9050");
        assert!(text.contains("a&lt;b&gt;.onion"));
        assert!(text.contains("Interval: 120s"));
    }
}
