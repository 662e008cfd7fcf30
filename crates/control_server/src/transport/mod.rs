//! Worker node transport.
//!
//! Nodes connect over WebSocket and exchange JSON messages with the control
//! service. This module defines the seam the pool relies on ([`NodeLink`]),
//! the lifecycle events the transport raises ([`NodeEvent`]) and the
//! WebSocket implementation of both.

pub mod handlers;
pub mod link;
pub mod protocol;

pub use handlers::handle_node_connection;
pub use link::WsNodeLink;
pub use protocol::{NodeCommand, NodeReport};

use crate::error::TransportError;
use crate::pool::{ChatId, NodeId};
use std::fmt::Debug;
use std::net::SocketAddr;
use std::sync::Arc;

/// Outbound half of a node connection as seen by the pool.
///
/// Implementations must be cheap to call from inside the pool lock: `route`
/// queues and returns, it never waits on the network.
pub trait NodeLink: Debug + Send + Sync {
    /// Whether the underlying connection is still open.
    fn is_connected(&self) -> bool;

    /// Queues a command for delivery to the node.
    fn route(&self, command: NodeCommand) -> Result<(), TransportError>;
}

/// Lifecycle and game events raised by the node transport.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// A node finished its handshake
    Connected {
        node_id: NodeId,
        link: Arc<dyn NodeLink>,
        remote_addr: SocketAddr,
    },
    /// The node's connection closed
    Disconnected { node_id: NodeId },
    /// The node reports that a game finished normally
    GameEnded { node_id: NodeId, group_id: ChatId },
    /// The node is draining before it exits
    ShuttingDown { node_id: NodeId },
}
