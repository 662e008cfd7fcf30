//! Worker node representation.
//!
//! A [`Node`] is one connected worker process together with the games it
//! currently hosts. Nodes are only ever mutated through the owning
//! [`NodePool`](super::NodePool), which keeps them behind its lock.

use crate::dispatch::UserId;
use crate::error::TransportError;
use crate::transport::{NodeCommand, NodeLink};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Chat identifier as issued by the chat platform. Group chats are the
/// routing key for games.
pub type ChatId = i64;

/// Unique identifier for a connected worker node.
///
/// A fresh id is minted for every connection, so a node that reconnects is a
/// new node as far as the pool is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle state of a node that is still in the pool.
///
/// `Removed` is not represented here: a removed node is simply gone from the
/// pool and its id is retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Accepting new games
    Connected,
    /// Draining: existing games stay routable, no new games are placed here
    ShuttingDown,
}

/// One running game session as tracked by the control service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameInfo {
    /// The group chat hosting the game
    pub group_id: ChatId,
    /// Node that owns the session
    pub node_id: NodeId,
    /// User who started the game, when known
    pub initiator: Option<UserId>,
    /// When the game was attached to its node
    pub started_at: DateTime<Utc>,
}

/// A connected worker process and the games it owns.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    link: Arc<dyn NodeLink>,
    capacity: usize,
    pub(super) state: NodeState,
    pub(super) games: HashMap<ChatId, GameInfo>,
    connected_at: DateTime<Utc>,
    /// Insertion order within the pool; used to break load ties deterministically
    pub(super) sequence: u64,
}

impl Node {
    /// Creates a node in the `Connected` state with no games.
    ///
    /// # Arguments
    ///
    /// * `id` - Identity minted by the transport for this connection
    /// * `link` - Transport link used to route commands and probe liveness
    /// * `capacity` - Maximum number of games the pool will place here
    pub fn new(id: NodeId, link: Arc<dyn NodeLink>, capacity: usize) -> Self {
        Self {
            id,
            link,
            capacity,
            state: NodeState::Connected,
            games: HashMap::new(),
            connected_at: Utc::now(),
            sequence: 0,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn game_count(&self) -> usize {
        self.games.len()
    }

    /// Whether the underlying transport still reports the node as connected.
    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// A node can take a new game when it is connected, not draining and
    /// below capacity.
    pub fn is_eligible(&self) -> bool {
        self.state == NodeState::Connected
            && self.game_count() < self.capacity
            && self.is_connected()
    }

    pub fn handle(&self) -> NodeHandle {
        NodeHandle {
            id: self.id,
            link: self.link.clone(),
        }
    }

    pub fn summary(&self) -> NodeSummary {
        NodeSummary {
            id: self.id,
            state: self.state,
            game_count: self.game_count(),
            capacity: self.capacity,
            connected: self.is_connected(),
            connected_at: self.connected_at,
        }
    }
}

/// Cheap, cloneable reference to a node used for routing outside the pool lock.
#[derive(Debug, Clone)]
pub struct NodeHandle {
    id: NodeId,
    link: Arc<dyn NodeLink>,
}

impl NodeHandle {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// Queues a command for the node. Never waits on the network.
    pub fn route(&self, command: NodeCommand) -> Result<(), TransportError> {
        self.link.route(command)
    }
}

/// Point-in-time view of a node for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub id: NodeId,
    pub state: NodeState,
    pub game_count: usize,
    pub capacity: usize,
    pub connected: bool,
    pub connected_at: DateTime<Utc>,
}
