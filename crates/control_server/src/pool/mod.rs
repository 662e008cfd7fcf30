//! Worker node pool.
//!
//! Tracks which node owns which game, places new games on the least loaded
//! healthy node and cleans up after nodes that disconnect.

pub mod manager;
pub mod node;

pub use manager::{GameLocation, NodePool, NODE_LOST_MESSAGE};
pub use node::{ChatId, GameInfo, Node, NodeHandle, NodeId, NodeState, NodeSummary};
