//! Operator commands: node inspection, draining and counters.

use control_server::commands::HandlerResult;
use control_server::dispatch::Update;
use control_server::error::{HandlerError, PoolError};
use control_server::pool::{NodeId, NodeState};
use control_server::ControlContext;
use std::sync::Arc;
use tracing::info;

pub const DRAIN_USAGE: &str = "Usage: /drain <node-id>";

/// Lists every node with its load, in join order.
pub async fn nodes(
    ctx: Arc<ControlContext>,
    update: Update,
    _args: Vec<String>,
) -> HandlerResult {
    let nodes = ctx.pool().snapshot().await;
    if nodes.is_empty() {
        ctx.reply(&update, "No nodes connected.");
        return Ok(());
    }

    let mut lines = vec![format!("{} node(s):", nodes.len())];
    for node in &nodes {
        let state = match (node.state, node.connected) {
            (_, false) => "disconnected",
            (NodeState::ShuttingDown, true) => "draining",
            (NodeState::Connected, true) => "active",
        };
        lines.push(format!(
            "{} {} {}/{} games (since {})",
            node.id,
            state,
            node.game_count,
            node.capacity,
            node.connected_at.format("%Y-%m-%d %H:%M UTC")
        ));
    }
    ctx.reply(&update, lines.join("\n"));
    Ok(())
}

/// Stops placing new games on a node. Running games are unaffected.
pub async fn drain(ctx: Arc<ControlContext>, update: Update, args: Vec<String>) -> HandlerResult {
    let Some(raw) = args.first() else {
        ctx.reply(&update, DRAIN_USAGE);
        return Err(HandlerError::InvalidArguments("missing node id".to_string()));
    };
    let node_id: NodeId = match raw.parse() {
        Ok(node_id) => node_id,
        Err(e) => {
            ctx.reply(&update, DRAIN_USAGE);
            return Err(HandlerError::InvalidArguments(format!("'{}': {}", raw, e)));
        }
    };

    match ctx.pool().mark_shutting_down(node_id).await {
        Ok(()) => {
            info!("🛑 Node {} drained by user {}", node_id, update.sender_id());
            ctx.reply(&update, format!("Node {} will take no new games.", node_id));
            Ok(())
        }
        Err(PoolError::NodeNotFound(_)) => {
            ctx.reply(&update, format!("No node with id {}.", node_id));
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn stats(
    ctx: Arc<ControlContext>,
    update: Update,
    _args: Vec<String>,
) -> HandlerResult {
    let stats = ctx.stats().snapshot();
    let nodes = ctx.pool().len().await;
    let games = ctx.pool().game_count().await;

    let lines = [
        format!("Nodes: {}", nodes),
        format!("Active games: {}", games),
        format!("Updates received: {}", stats.updates_received),
        format!("Commands dispatched: {}", stats.commands_dispatched),
        format!("Commands denied: {}", stats.commands_denied),
        format!("Games started: {}", stats.games_started),
        format!("Players joined: {}", stats.players_joined),
        format!("Nodes lost: {} ({} games)", stats.nodes_lost, stats.games_lost),
    ];
    ctx.reply(&update, lines.join("\n"));
    Ok(())
}
