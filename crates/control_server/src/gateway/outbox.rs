//! Fire-and-forget queue for outbound chat messages.

use super::{ChatGateway, OutboundMessage};
use crate::pool::ChatId;
use crate::shutdown::ShutdownState;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Sending half of the outbound message queue.
///
/// Cloned freely into the pool, the dispatcher and handlers. Sending never
/// blocks; a single delivery task ([`run_delivery`]) drains the queue in order.
#[derive(Debug, Clone)]
pub struct Outbox {
    sender: mpsc::UnboundedSender<OutboundMessage>,
}

impl Outbox {
    /// Creates an outbox and the receiver its delivery task should drain.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn send(&self, message: OutboundMessage) {
        let chat_id = message.chat_id;
        if let Err(e) = self.sender.send(message) {
            warn!("Outbox closed, dropping message for chat {}: {:?}", chat_id, e.0.text);
        }
    }

    pub fn send_text(&self, chat_id: ChatId, text: impl Into<String>) {
        self.send(OutboundMessage::text(chat_id, text));
    }
}

/// Delivers queued messages through the gateway until every sender is gone
/// or `shutdown` is initiated.
///
/// On shutdown the queue is closed to new messages, whatever was already
/// queued is delivered, and then `shutdown` is marked complete. Delivery
/// failures are logged and dropped; nothing upstream waits on them.
pub async fn run_delivery(
    gateway: Arc<dyn ChatGateway>,
    mut receiver: mpsc::UnboundedReceiver<OutboundMessage>,
    shutdown: ShutdownState,
) {
    loop {
        tokio::select! {
            message = receiver.recv() => match message {
                Some(message) => deliver(gateway.as_ref(), &message).await,
                None => break,
            },
            _ = shutdown.initiated() => break,
        }
    }

    receiver.close();
    let mut flushed = 0usize;
    while let Some(message) = receiver.recv().await {
        deliver(gateway.as_ref(), &message).await;
        flushed += 1;
    }
    if flushed > 0 {
        info!("📤 Flushed {} queued message(s) before exit", flushed);
    }
    debug!("Outbox closed, delivery task exiting");
    shutdown.complete_shutdown();
}

async fn deliver(gateway: &dyn ChatGateway, message: &OutboundMessage) {
    match gateway.deliver(message).await {
        Ok(()) => debug!("📤 Delivered message to chat {}", message.chat_id),
        Err(e) => warn!("Failed to deliver message to chat {}: {}", message.chat_id, e),
    }
}
