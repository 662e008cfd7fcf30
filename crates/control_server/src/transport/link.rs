//! WebSocket-backed node link.

use super::{NodeCommand, NodeLink};
use crate::error::TransportError;
use crate::pool::NodeId;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// [`NodeLink`] for a node connected over WebSocket.
///
/// Commands are serialized and handed to the connection's outgoing task
/// through an unbounded channel. The connected flag is cleared by the
/// connection handler when the socket closes, or here when the outgoing task
/// has already gone away.
#[derive(Debug)]
pub struct WsNodeLink {
    node_id: NodeId,
    sender: mpsc::UnboundedSender<String>,
    connected: AtomicBool,
}

impl WsNodeLink {
    pub fn new(node_id: NodeId, sender: mpsc::UnboundedSender<String>) -> Self {
        Self {
            node_id,
            sender,
            connected: AtomicBool::new(true),
        }
    }

    /// Marks the link as closed. Subsequent routes fail fast.
    pub fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
    }
}

impl NodeLink for WsNodeLink {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire) && !self.sender.is_closed()
    }

    fn route(&self, command: NodeCommand) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected(self.node_id));
        }
        let payload = serde_json::to_string(&command)?;
        self.sender.send(payload).map_err(|_| {
            self.mark_disconnected();
            TransportError::Disconnected(self.node_id)
        })
    }
}
