//! lnwatch telegram - operator chat transport and command handling.

pub mod bot;
pub mod dispatcher;

pub use bot::TelegramBot;
pub use dispatcher::{parse_command, Command, CommandDispatcher, Dispatch};

use lnwatch_core::{CommandSource, InboundMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Reply sent to chats other than the operator's.
pub const REJECTION: &str = "⛔ Unauthorized";

const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Discard the update backlog, then dispatch inbound commands until
/// `shutdown` flips to true.
///
/// Each message is handled on its own task so a slow node query does not
/// hold up the next command.
pub async fn run_listener(
    source: Arc<dyn CommandSource>,
    dispatcher: Arc<CommandDispatcher>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        let drained = tokio::select! {
            result = source.drain_backlog() => result,
            _ = shutdown.changed() => return,
        };
        match drained {
            Ok(dropped) => {
                info!(dropped, "Discarded pending updates, listening for commands");
                break;
            }
            Err(e) => {
                warn!("Could not drain pending updates: {}", e);
                tokio::select! {
                    _ = tokio::time::sleep(POLL_ERROR_BACKOFF) => {}
                    _ = shutdown.changed() => return,
                }
            }
        }
    }

    loop {
        if *shutdown.borrow() {
            break;
        }
        let batch = tokio::select! {
            batch = source.next_batch() => batch,
            _ = shutdown.changed() => break,
        };

        match batch {
            Ok(messages) => {
                for message in messages {
                    let source = source.clone();
                    let dispatcher = dispatcher.clone();
                    tokio::spawn(async move {
                        handle_message(source.as_ref(), &dispatcher, message).await;
                    });
                }
            }
            Err(e) => {
                warn!("Error polling for commands: {}", e);
                tokio::select! {
                    _ = tokio::time::sleep(POLL_ERROR_BACKOFF) => {}
                    _ = shutdown.changed() => break,
                }
            }
        }
    }

    info!("Command listener stopped");
}

async fn handle_message(source: &dyn CommandSource, dispatcher: &CommandDispatcher, message: InboundMessage) {
    let reply = match dispatcher.dispatch(&message).await {
        Dispatch::Reply(text) => text,
        Dispatch::Unauthorized => REJECTION.to_string(),
        Dispatch::Ignored => return,
    };
    if let Err(e) = source.reply(message.chat_id, &reply).await {
        error!(chat_id = message.chat_id, "Failed to send reply: {}", e);
    }
}
