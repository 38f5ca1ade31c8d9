//! Maps operator commands to node queries and report replies.

use lnwatch_core::report::{
    self, BalanceSummary, ChannelSummary, FeeSummary, PeerSummary,
};
use lnwatch_core::{InboundMessage, NodeSnapshot};
use lnwatch_node::NodeApi;
use std::sync::Arc;
use tracing::{info, warn};

/// A recognised bot command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Info,
    Balance,
    Channels,
    Peers,
    Fees,
    Unknown(String),
}

/// Parse a chat message into a command. Plain text is not a command.
///
/// Accepts the `/command@botname` form Telegram uses in groups and ignores
/// trailing arguments.
pub fn parse_command(text: &str) -> Option<Command> {
    let word = text.split_whitespace().next()?;
    let name = word.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or(name).to_ascii_lowercase();

    Some(match name.as_str() {
        "help" | "start" => Command::Help,
        "info" => Command::Info,
        "balance" => Command::Balance,
        "channels" => Command::Channels,
        "peers" => Command::Peers,
        "fees" => Command::Fees,
        _ => Command::Unknown(name),
    })
}

/// What the listener should do with one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Reply(String),
    /// Not a command; say nothing.
    Ignored,
    /// A command from a chat other than the operator's.
    Unauthorized,
}

pub fn help_text() -> String {
    "🤖 <b>LND Monitor commands</b>\n\n\
     /info - node status and sync\n\
     /balance - on-chain and channel balances\n\
     /channels - channel summary\n\
     /peers - connected peers\n\
     /fees - routing fees (30 days)\n\
     /help - this message"
        .to_string()
}

fn unavailable(what: &str) -> String {
    format!("❌ Node unreachable, unable to get {}.", what)
}

/// Routes commands from the authorized operator to the node.
pub struct CommandDispatcher {
    node: Arc<dyn NodeApi>,
    operator: i64,
}

impl CommandDispatcher {
    pub fn new(node: Arc<dyn NodeApi>, operator: i64) -> Self {
        Self { node, operator }
    }

    /// Authorize, parse and execute one message. The authorization check
    /// runs before any node call.
    pub async fn dispatch(&self, message: &InboundMessage) -> Dispatch {
        let Some(command) = parse_command(&message.text) else {
            return Dispatch::Ignored;
        };
        if message.chat_id != self.operator {
            warn!(chat_id = message.chat_id, command = ?command, "Rejected command from unauthorized chat");
            return Dispatch::Unauthorized;
        }
        info!(command = ?command, "Handling operator command");
        Dispatch::Reply(self.execute(command).await)
    }

    async fn execute(&self, command: Command) -> String {
        match command {
            Command::Help => help_text(),
            Command::Info => self.info().await,
            Command::Balance => self.balance().await,
            Command::Channels => self.channels().await,
            Command::Peers => self.peers().await,
            Command::Fees => self.fees().await,
            Command::Unknown(name) => format!(
                "❓ Unknown command <code>/{}</code>. Send /help for the list.",
                report::escape_html(&name)
            ),
        }
    }

    async fn info(&self) -> String {
        match self.node.get_info().await {
            Some(info) => report::info_report(&NodeSnapshot::from_json(&info)),
            None => unavailable("node info"),
        }
    }

    async fn balance(&self) -> String {
        let (wallet, channels) = tokio::join!(self.node.wallet_balance(), self.node.channel_balance());
        let (Some(wallet), Some(channels)) = (wallet, channels) else {
            return unavailable("balances");
        };
        match BalanceSummary::from_json(&wallet, &channels) {
            Ok(summary) => summary.render(),
            Err(e) => report::degraded("balance", &e),
        }
    }

    async fn channels(&self) -> String {
        let (list, pending) = tokio::join!(self.node.list_channels(), self.node.pending_channels());
        let Some(list) = list else {
            return unavailable("channels");
        };
        match ChannelSummary::from_json(&list, pending.as_ref()) {
            Ok(summary) => summary.render(),
            Err(e) => report::degraded("channel", &e),
        }
    }

    async fn peers(&self) -> String {
        let (peers, info) = tokio::join!(self.node.list_peers(), self.node.get_info());
        let Some(peers) = peers else {
            return unavailable("peers");
        };
        let synced = info.and_then(|i| i.get("synced_to_graph").and_then(|v| v.as_bool()));
        match PeerSummary::from_json(&peers, synced) {
            Ok(summary) => summary.render(),
            Err(e) => report::degraded("peer", &e),
        }
    }

    async fn fees(&self) -> String {
        let Some(history) = self.node.forwarding_history().await else {
            return unavailable("forwarding history");
        };
        match FeeSummary::from_json(&history) {
            Ok(summary) => summary.render(),
            Err(e) => report::degraded("fee", &e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("/info"), Some(Command::Info));
        assert_eq!(parse_command("  /Fees now"), Some(Command::Fees));
        assert_eq!(parse_command("/balance@lnwatch_bot"), Some(Command::Balance));
        assert_eq!(parse_command("/start"), Some(Command::Help));
        assert_eq!(parse_command("/reboot"), Some(Command::Unknown("reboot".into())));
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command(""), None);
    }
}
