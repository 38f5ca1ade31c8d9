use async_trait::async_trait;
use lnwatch_core::{CommandSource, InboundMessage, NotifyError};
use lnwatch_node::NodeApi;
use lnwatch_telegram::{run_listener, CommandDispatcher, Dispatch, REJECTION};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const OPERATOR: i64 = 1001;
const STRANGER: i64 = 666;

/// Serves fixture payloads and counts every node call.
struct FixtureNode {
    online: bool,
    calls: AtomicUsize,
    channels: Value,
}

impl FixtureNode {
    fn online() -> Arc<Self> {
        Arc::new(Self {
            online: true,
            calls: AtomicUsize::new(0),
            channels: json!({"channels": [
                {"active": true, "peer_alias": "ACINQ", "capacity": "2000000", "local_balance": "1500000", "remote_balance": "500000"},
                {"active": false, "peer_alias": "Kraken", "capacity": "1000000", "local_balance": "200000", "remote_balance": "800000"}
            ]}),
        })
    }

    fn offline() -> Arc<Self> {
        Arc::new(Self {
            online: false,
            calls: AtomicUsize::new(0),
            channels: Value::Null,
        })
    }

    fn with_channels(channels: Value) -> Arc<Self> {
        Arc::new(Self {
            online: true,
            calls: AtomicUsize::new(0),
            channels,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn answer(&self, payload: Value) -> Option<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.online.then_some(payload)
    }
}

#[async_trait]
impl NodeApi for FixtureNode {
    async fn get_info(&self) -> Option<Value> {
        self.answer(json!({
            "alias": "fixture-node",
            "version": "0.18.5-beta",
            "block_height": 870123,
            "synced_to_chain": true,
            "synced_to_graph": true,
            "num_active_channels": 1,
            "num_peers": 2,
            "identity_pubkey": "02fixture"
        }))
    }
    async fn wallet_balance(&self) -> Option<Value> {
        self.answer(json!({"total_balance": "500000", "confirmed_balance": "500000", "unconfirmed_balance": "0"}))
    }
    async fn channel_balance(&self) -> Option<Value> {
        self.answer(json!({"local_balance": {"sat": "1700000"}, "remote_balance": {"sat": "1300000"}}))
    }
    async fn list_channels(&self) -> Option<Value> {
        self.answer(self.channels.clone())
    }
    async fn pending_channels(&self) -> Option<Value> {
        self.answer(json!({"pending_open_channels": [{}]}))
    }
    async fn list_peers(&self) -> Option<Value> {
        self.answer(json!({"peers": [
            {"pub_key": "03aaaaaaaaaaaa", "address": "qwertyuiopasdfgh.onion:9735", "inbound": true},
            {"pub_key": "02bbbbbbbbbbbb", "address": "203.0.113.9:9735", "inbound": false}
        ]}))
    }
    async fn forwarding_history(&self) -> Option<Value> {
        self.answer(json!({"forwarding_events": [
            {"fee_msat": "1000", "amt_out_msat": "500000", "timestamp": "1700000000"},
            {"fee_msat": "2000", "amt_out_msat": "1000000", "timestamp": "1700000100"}
        ]}))
    }
}

fn message(chat_id: i64, text: &str) -> InboundMessage {
    InboundMessage {
        update_id: 0,
        chat_id,
        text: text.to_string(),
    }
}

async fn reply_to(node: Arc<FixtureNode>, text: &str) -> String {
    let dispatcher = CommandDispatcher::new(node, OPERATOR);
    match dispatcher.dispatch(&message(OPERATOR, text)).await {
        Dispatch::Reply(reply) => reply,
        other => panic!("expected a reply, got {:?}", other),
    }
}

#[tokio::test]
async fn stranger_commands_never_reach_the_node() {
    let node = FixtureNode::online();
    let dispatcher = CommandDispatcher::new(node.clone(), OPERATOR);

    for text in ["/info", "/balance", "/channels", "/peers", "/fees", "/help"] {
        assert_eq!(
            dispatcher.dispatch(&message(STRANGER, text)).await,
            Dispatch::Unauthorized
        );
    }
    assert_eq!(node.calls(), 0);
}

#[tokio::test]
async fn plain_text_is_ignored() {
    let node = FixtureNode::online();
    let dispatcher = CommandDispatcher::new(node.clone(), OPERATOR);
    assert_eq!(dispatcher.dispatch(&message(OPERATOR, "hi there")).await, Dispatch::Ignored);
    assert_eq!(dispatcher.dispatch(&message(STRANGER, "hi there")).await, Dispatch::Ignored);
    assert_eq!(node.calls(), 0);
}

#[tokio::test]
async fn unknown_command_gets_explicit_reply() {
    let reply = reply_to(FixtureNode::online(), "/reboot").await;
    assert!(reply.contains("Unknown command"));
    assert!(reply.contains("/reboot"));
}

#[tokio::test]
async fn info_reports_live_node_data() {
    let reply = reply_to(FixtureNode::online(), "/info").await;
    assert!(reply.contains("fixture-node"));
    assert!(reply.contains("870123"));
    assert!(reply.contains("<code>02fixture</code>"));
}

#[tokio::test]
async fn balance_combines_both_endpoints() {
    let reply = reply_to(FixtureNode::online(), "/balance").await;
    assert!(reply.contains("Total: 500.0k sats (500,000)"));
    assert!(reply.contains("Local: 1.70M sats (1,700,000)"));
    assert!(reply.contains("Total owned:</b> 2.20M sats (2,200,000)"));
}

#[tokio::test]
async fn channels_lists_largest_first() {
    let reply = reply_to(FixtureNode::online(), "/channels").await;
    assert!(reply.contains("🟢 1 online / 🔴 1 offline"));
    assert!(reply.contains("Pending: 1"));
    let acinq = reply.find("ACINQ").unwrap();
    let kraken = reply.find("Kraken").unwrap();
    assert!(acinq < kraken);
}

#[tokio::test]
async fn peers_shortens_onion_addresses() {
    let reply = reply_to(FixtureNode::online(), "/peers").await;
    assert!(reply.contains("Connected: 2"));
    assert!(reply.contains("qwertyui….onion:9735"));
    assert!(reply.contains("203.0.113.9:9735"));
    assert!(reply.contains("Graph synced: Yes"));
}

#[tokio::test]
async fn fees_summarises_forwarding_history() {
    let reply = reply_to(FixtureNode::online(), "/fees").await;
    assert!(reply.contains("Earned: 3 sats"));
    assert!(reply.contains("Forwards: 2"));
    assert!(reply.contains("Average fee: 1 sats"));
    assert!(reply.contains("Volume: 1.5k sats (1,500)"));
}

#[tokio::test]
async fn offline_node_yields_unavailable_message() {
    for text in ["/info", "/balance", "/channels", "/peers", "/fees"] {
        let reply = reply_to(FixtureNode::offline(), text).await;
        assert!(reply.contains("Node unreachable"), "{}: {}", text, reply);
    }
}

#[tokio::test]
async fn malformed_payload_degrades_gracefully() {
    let reply = reply_to(FixtureNode::with_channels(json!({"unexpected": true})), "/channels").await;
    assert!(reply.contains("Could not read channel data"));
}

/// In-memory chat: `backlog` holds messages sent before the listener
/// started, `live` holds batches delivered afterwards.
struct FakeChat {
    backlog: Mutex<Vec<InboundMessage>>,
    live: Mutex<VecDeque<Vec<InboundMessage>>>,
    replies: Mutex<Vec<(i64, String)>>,
    /// Number of upcoming polls that fail before live batches are served.
    poll_failures: AtomicUsize,
    polls: AtomicUsize,
}

impl FakeChat {
    fn new(backlog: Vec<InboundMessage>, live: Vec<Vec<InboundMessage>>) -> Arc<Self> {
        Self::failing(backlog, live, 0)
    }

    fn failing(backlog: Vec<InboundMessage>, live: Vec<Vec<InboundMessage>>, poll_failures: usize) -> Arc<Self> {
        Arc::new(Self {
            backlog: Mutex::new(backlog),
            live: Mutex::new(live.into()),
            replies: Mutex::new(Vec::new()),
            poll_failures: AtomicUsize::new(poll_failures),
            polls: AtomicUsize::new(0),
        })
    }

    fn replies(&self) -> Vec<(i64, String)> {
        self.replies.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandSource for FakeChat {
    async fn drain_backlog(&self) -> Result<usize, NotifyError> {
        let mut backlog = self.backlog.lock().unwrap();
        let dropped = backlog.len();
        backlog.clear();
        Ok(dropped)
    }

    async fn next_batch(&self) -> Result<Vec<InboundMessage>, NotifyError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .poll_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(NotifyError::Http("connection reset".into()));
        }
        let next = self.live.lock().unwrap().pop_front();
        match next {
            Some(batch) => Ok(batch),
            None => {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(Vec::new())
            }
        }
    }

    async fn reply(&self, chat_id: i64, text: &str) -> Result<(), NotifyError> {
        self.replies.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }
}

#[tokio::test]
async fn listener_drains_backlog_before_dispatching() {
    let node = FixtureNode::online();
    let chat = FakeChat::new(
        vec![message(OPERATOR, "/info"), message(OPERATOR, "/fees")],
        vec![vec![message(OPERATOR, "/help")], vec![message(STRANGER, "/balance")]],
    );
    let dispatcher = Arc::new(CommandDispatcher::new(node.clone(), OPERATOR));
    let (tx, rx) = tokio::sync::watch::channel(false);

    let handle = tokio::spawn(run_listener(chat.clone(), dispatcher, rx));
    tokio::time::sleep(Duration::from_millis(100)).await;
    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("listener did not stop")
        .unwrap();

    let mut replies = chat.replies();
    replies.sort();
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0], (STRANGER, REJECTION.to_string()));
    assert_eq!(replies[1].0, OPERATOR);
    assert!(replies[1].1.contains("LND Monitor commands"));
    assert_eq!(node.calls(), 0, "backlogged commands must not be executed");
}

#[tokio::test(start_paused = true)]
async fn listener_survives_poll_errors() {
    let node = FixtureNode::online();
    let chat = FakeChat::failing(
        Vec::new(),
        vec![vec![message(OPERATOR, "/info")]],
        2,
    );
    let dispatcher = Arc::new(CommandDispatcher::new(node.clone(), OPERATOR));
    let (tx, rx) = tokio::sync::watch::channel(false);

    let handle = tokio::spawn(run_listener(chat.clone(), dispatcher, rx));
    tokio::time::sleep(Duration::from_secs(30)).await;
    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("listener did not stop")
        .unwrap();

    assert!(chat.polls.load(Ordering::SeqCst) > 3);
    let replies = chat.replies();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].0, OPERATOR);
    assert!(replies[0].1.contains("fixture-node"));
    assert_eq!(node.calls(), 1);
}
