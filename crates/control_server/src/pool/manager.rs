//! Load-aware registry of worker nodes.
//!
//! The pool owns every connected [`Node`] and, through them, every active
//! game. All state lives behind a single `RwLock` so that scans (selection,
//! game lookup, snapshots) always observe a consistent view and never race
//! with node or game mutations.

use super::node::{ChatId, GameInfo, Node, NodeHandle, NodeId, NodeSummary};
use crate::dispatch::UserId;
use crate::error::PoolError;
use crate::gateway::{OutboundMessage, Outbox};
use crate::stats::ControlStats;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Message sent to every group whose game was lost with its node.
pub const NODE_LOST_MESSAGE: &str = "Something went wrong, and this node has shut down.";

/// Location of an active game: the owning node and the game itself.
#[derive(Debug, Clone)]
pub struct GameLocation {
    pub node: NodeHandle,
    pub game: GameInfo,
}

#[derive(Debug, Default)]
struct PoolState {
    nodes: HashMap<NodeId, Node>,
    /// Index of group chat to owning node; mirrors the nodes' game sets
    groups: HashMap<ChatId, NodeId>,
    /// Ids of removed nodes; these never re-enter the pool
    retired: HashSet<NodeId>,
}

impl PoolState {
    /// Notifies every group on the node, then evicts its games and the node.
    ///
    /// Runs under the write lock, so no reader can observe a game that has
    /// been evicted without its group having been notified first.
    fn evict(
        &mut self,
        node_id: NodeId,
        outbox: &Outbox,
        stats: &ControlStats,
    ) -> Option<Vec<GameInfo>> {
        let node = self.nodes.get_mut(&node_id)?;

        for game in node.games.values() {
            outbox.send(OutboundMessage::text(game.group_id, NODE_LOST_MESSAGE));
        }

        let evicted: Vec<GameInfo> = node.games.drain().map(|(_, game)| game).collect();
        for game in &evicted {
            self.groups.remove(&game.group_id);
        }

        self.nodes.remove(&node_id);
        self.retired.insert(node_id);
        stats.record_node_lost();
        stats.record_games_lost(evicted.len());
        Some(evicted)
    }

    /// Drops nodes whose transport no longer reports a live connection.
    fn sweep_disconnected(&mut self, outbox: &Outbox, stats: &ControlStats) -> usize {
        let dead: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|node| !node.is_connected())
            .map(|node| node.id())
            .collect();

        for node_id in &dead {
            if let Some(evicted) = self.evict(*node_id, outbox, stats) {
                warn!(
                    "💀 Swept dead node {} ({} game(s) lost)",
                    node_id,
                    evicted.len()
                );
            }
        }
        dead.len()
    }

    /// Least loaded eligible node; ties go to the node that joined first.
    fn best_node(&self) -> Option<&Node> {
        self.nodes
            .values()
            .filter(|node| node.is_eligible())
            .min_by_key(|node| (node.game_count(), node.sequence))
    }

    fn attach(
        &mut self,
        node_id: NodeId,
        group_id: ChatId,
        initiator: Option<UserId>,
    ) -> Result<GameInfo, PoolError> {
        if self.groups.contains_key(&group_id) {
            return Err(PoolError::GameAlreadyActive(group_id));
        }
        let node = self
            .nodes
            .get_mut(&node_id)
            .ok_or(PoolError::NodeNotFound(node_id))?;

        let game = GameInfo {
            group_id,
            node_id,
            initiator,
            started_at: Utc::now(),
        };
        node.games.insert(group_id, game.clone());
        self.groups.insert(group_id, node_id);
        Ok(game)
    }
}

/// Central registry of connected worker nodes and the games they host.
///
/// # Architecture
///
/// * One `RwLock<PoolState>` guards nodes, games and the group index together
/// * Mutations (add/remove, attach/detach, sweeps) take the write lock
/// * Lookups and snapshots take the read lock and see a consistent view
/// * Failure notices go to the [`Outbox`], which never blocks
/// * Every eviction, explicit or swept, is counted in [`ControlStats`]
#[derive(Debug)]
pub struct NodePool {
    state: RwLock<PoolState>,
    outbox: Outbox,
    stats: Arc<ControlStats>,
    next_sequence: AtomicU64,
}

impl NodePool {
    /// Creates an empty pool that reports lost games through `outbox` and
    /// counts lost nodes in `stats`.
    pub fn new(outbox: Outbox, stats: Arc<ControlStats>) -> Self {
        Self {
            state: RwLock::new(PoolState::default()),
            outbox,
            stats,
            next_sequence: AtomicU64::new(0),
        }
    }

    /// Inserts a newly connected node.
    ///
    /// # Errors
    ///
    /// * [`PoolError::DuplicateNode`] if the id is already in the pool
    /// * [`PoolError::NodeRetired`] if the id belonged to a removed node
    pub async fn add_node(&self, mut node: Node) -> Result<(), PoolError> {
        let mut state = self.state.write().await;
        let node_id = node.id();

        if state.nodes.contains_key(&node_id) {
            return Err(PoolError::DuplicateNode(node_id));
        }
        if state.retired.contains(&node_id) {
            return Err(PoolError::NodeRetired(node_id));
        }

        node.sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        info!(
            "🔗 Node {} joined the pool (capacity {})",
            node_id,
            node.capacity()
        );
        state.nodes.insert(node_id, node);
        Ok(())
    }

    /// Removes a node, notifying each of its groups before evicting the games.
    ///
    /// # Returns
    ///
    /// The games that were evicted, or `None` if the node was not in the pool.
    pub async fn remove_node(&self, node_id: NodeId) -> Option<Vec<GameInfo>> {
        let mut state = self.state.write().await;
        let evicted = state.evict(node_id, &self.outbox, &self.stats)?;
        info!(
            "❌ Node {} removed from the pool ({} game(s) evicted)",
            node_id,
            evicted.len()
        );
        Some(evicted)
    }

    /// Picks the least loaded node that can take a new game.
    ///
    /// Nodes whose transport reports them disconnected are removed first, with
    /// the same notifications as [`remove_node`](Self::remove_node).
    /// `None` means no capacity is available right now.
    pub async fn select_best_node(&self) -> Option<NodeHandle> {
        let mut state = self.state.write().await;
        state.sweep_disconnected(&self.outbox, &self.stats);
        state.best_node().map(Node::handle)
    }

    /// Selects a node and attaches a new game for `group_id` in one step.
    ///
    /// Dead nodes are swept first, so a game left on a disconnected node
    /// does not count as active.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(..))` with the chosen node and the new game
    /// * `Ok(None)` when no node has capacity
    /// * `Err(PoolError::GameAlreadyActive)` when the group already has a game
    pub async fn assign_game(
        &self,
        group_id: ChatId,
        initiator: Option<UserId>,
    ) -> Result<Option<(NodeHandle, GameInfo)>, PoolError> {
        let mut state = self.state.write().await;
        state.sweep_disconnected(&self.outbox, &self.stats);
        if state.groups.contains_key(&group_id) {
            return Err(PoolError::GameAlreadyActive(group_id));
        }

        let Some(node) = state.best_node().map(Node::handle) else {
            return Ok(None);
        };

        let game = state.attach(node.id(), group_id, initiator)?;
        debug!("🎲 Group {} assigned to node {}", group_id, node.id());
        Ok(Some((node, game)))
    }

    /// Attaches a game for `group_id` to a specific node.
    ///
    /// Capacity is a selection constraint only, so this succeeds even if the
    /// node is at or over capacity.
    pub async fn attach_game(
        &self,
        node_id: NodeId,
        group_id: ChatId,
        initiator: Option<UserId>,
    ) -> Result<GameInfo, PoolError> {
        let mut state = self.state.write().await;
        state.attach(node_id, group_id, initiator)
    }

    /// Detaches the game for `group_id`, whichever node owns it.
    pub async fn end_game(&self, group_id: ChatId) -> Option<GameInfo> {
        let mut state = self.state.write().await;
        let node_id = state.groups.remove(&group_id)?;
        state
            .nodes
            .get_mut(&node_id)
            .and_then(|node| node.games.remove(&group_id))
    }

    /// Detaches the game for `group_id` only if `node_id` owns it.
    ///
    /// Used for end-of-game reports from nodes, which must not detach a game
    /// that has since been placed elsewhere.
    pub async fn release_game(&self, node_id: NodeId, group_id: ChatId) -> Option<GameInfo> {
        let mut state = self.state.write().await;
        if state.groups.get(&group_id) != Some(&node_id) {
            return None;
        }
        state.groups.remove(&group_id);
        state
            .nodes
            .get_mut(&node_id)
            .and_then(|node| node.games.remove(&group_id))
    }

    /// Finds the node and game for a group chat.
    pub async fn find_game(&self, group_id: ChatId) -> Option<GameLocation> {
        let state = self.state.read().await;
        let node_id = state.groups.get(&group_id)?;
        let node = state.nodes.get(node_id)?;
        let game = node.games.get(&group_id)?;
        Some(GameLocation {
            node: node.handle(),
            game: game.clone(),
        })
    }

    /// Moves a node into the draining state.
    ///
    /// Existing games stay routable; selection skips the node from now on.
    /// Marking a node that is already draining is a no-op.
    pub async fn mark_shutting_down(&self, node_id: NodeId) -> Result<(), PoolError> {
        let mut state = self.state.write().await;
        let node = state
            .nodes
            .get_mut(&node_id)
            .ok_or(PoolError::NodeNotFound(node_id))?;
        if node.state != super::NodeState::ShuttingDown {
            node.state = super::NodeState::ShuttingDown;
            info!(
                "🛑 Node {} is shutting down ({} game(s) still running)",
                node_id,
                node.game_count()
            );
        }
        Ok(())
    }

    /// Summaries of every node, in join order.
    pub async fn snapshot(&self) -> Vec<NodeSummary> {
        let state = self.state.read().await;
        let mut nodes: Vec<&Node> = state.nodes.values().collect();
        nodes.sort_by_key(|node| node.sequence);
        nodes.into_iter().map(Node::summary).collect()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.nodes.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.nodes.is_empty()
    }

    /// Number of active games across all nodes.
    pub async fn game_count(&self) -> usize {
        self.state.read().await.groups.len()
    }
}
