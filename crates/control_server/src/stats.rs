//! In-memory counters for monitoring. Nothing here is persisted.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-lifetime activity counters.
#[derive(Debug, Default)]
pub struct ControlStats {
    updates_received: AtomicU64,
    commands_dispatched: AtomicU64,
    commands_denied: AtomicU64,
    handler_failures: AtomicU64,
    games_started: AtomicU64,
    players_joined: AtomicU64,
    games_lost: AtomicU64,
    nodes_lost: AtomicU64,
}

/// Copy of the counters at one point in time.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub updates_received: u64,
    pub commands_dispatched: u64,
    pub commands_denied: u64,
    pub handler_failures: u64,
    pub games_started: u64,
    pub players_joined: u64,
    pub games_lost: u64,
    pub nodes_lost: u64,
}

impl ControlStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_update(&self) {
        self.updates_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_command(&self) {
        self.commands_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_denied(&self) {
        self.commands_denied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_handler_failure(&self) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_game_started(&self) {
        self.games_started.fetch_add(1, Ordering::Relaxed);
    }

    /// A join was forwarded to the node hosting the game.
    pub fn record_player_joined(&self) {
        self.players_joined.fetch_add(1, Ordering::Relaxed);
    }

    /// Games evicted because their node went away.
    pub fn record_games_lost(&self, count: usize) {
        self.games_lost.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// A node left the pool, by disconnect event or by sweep.
    pub fn record_node_lost(&self) {
        self.nodes_lost.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            updates_received: self.updates_received.load(Ordering::Relaxed),
            commands_dispatched: self.commands_dispatched.load(Ordering::Relaxed),
            commands_denied: self.commands_denied.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            games_started: self.games_started.load(Ordering::Relaxed),
            players_joined: self.players_joined.load(Ordering::Relaxed),
            games_lost: self.games_lost.load(Ordering::Relaxed),
            nodes_lost: self.nodes_lost.load(Ordering::Relaxed),
        }
    }
}
