//! Shared state handed to every command handler.

use crate::commands::CommandRegistry;
use crate::dispatch::Update;
use crate::gateway::{OutboundMessage, Outbox};
use crate::pool::NodePool;
use crate::stats::ControlStats;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Everything a handler may touch: the node pool, the outbound queue, the
/// counters and the (read-only) command table.
#[derive(Debug)]
pub struct ControlContext {
    pool: Arc<NodePool>,
    outbox: Outbox,
    stats: Arc<ControlStats>,
    registry: Arc<CommandRegistry>,
    started_at: Instant,
}

impl ControlContext {
    pub fn new(
        pool: Arc<NodePool>,
        outbox: Outbox,
        stats: Arc<ControlStats>,
        registry: Arc<CommandRegistry>,
    ) -> Self {
        Self {
            pool,
            outbox,
            stats,
            registry,
            started_at: Instant::now(),
        }
    }

    pub fn pool(&self) -> &Arc<NodePool> {
        &self.pool
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn stats(&self) -> &Arc<ControlStats> {
        &self.stats
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Queues a plain text reply to the chat the update came from.
    pub fn reply(&self, update: &Update, text: impl Into<String>) {
        self.outbox.send_text(update.chat_id(), text);
    }

    pub fn send(&self, message: OutboundMessage) {
        self.outbox.send(message);
    }
}
