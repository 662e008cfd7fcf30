//! Game lifecycle commands issued from group chats.

use super::{NODE_UNREACHABLE_MESSAGE, NO_GAME_MESSAGE};
use control_server::commands::HandlerResult;
use control_server::dispatch::Update;
use control_server::error::{HandlerError, PoolError};
use control_server::gateway::OutboundMessage;
use control_server::transport::NodeCommand;
use control_server::ControlContext;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const GAME_STARTING_MESSAGE: &str = "Starting a new game of Werewolf! Type /join to play.";
pub const ALREADY_RUNNING_MESSAGE: &str = "A game is already running in this group.";
pub const NO_CAPACITY_MESSAGE: &str =
    "All game servers are busy right now. Please try again later.";
pub const GAME_STOPPED_MESSAGE: &str = "The game has been stopped.";

/// Places a new game on the least loaded node and tells it to start.
pub async fn start_game(
    ctx: Arc<ControlContext>,
    update: Update,
    _args: Vec<String>,
) -> HandlerResult {
    let group_id = update.chat_id();

    let assigned = match ctx
        .pool()
        .assign_game(group_id, Some(update.sender_id()))
        .await
    {
        Ok(assigned) => assigned,
        Err(PoolError::GameAlreadyActive(_)) => {
            ctx.reply(&update, ALREADY_RUNNING_MESSAGE);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let Some((node, _game)) = assigned else {
        info!("🚫 No node capacity for a game in group {}", group_id);
        ctx.reply(&update, NO_CAPACITY_MESSAGE);
        return Ok(());
    };

    let command = NodeCommand::StartGame {
        group_id,
        chat_title: update.chat.title.clone(),
        initiator: update.from.clone(),
    };
    if let Err(e) = node.route(command) {
        // Only undo our own placement; the group may have moved meanwhile.
        ctx.pool().release_game(node.id(), group_id).await;
        ctx.reply(&update, NODE_UNREACHABLE_MESSAGE);
        return Err(e.into());
    }

    ctx.stats().record_game_started();
    info!("🎮 Game for group {} started on node {}", group_id, node.id());
    ctx.send(OutboundMessage::text(group_id, GAME_STARTING_MESSAGE).clear_menu());
    Ok(())
}

/// Forwards a join request to the node running the group's game.
pub async fn join_game(
    ctx: Arc<ControlContext>,
    update: Update,
    _args: Vec<String>,
) -> HandlerResult {
    let command = NodeCommand::JoinGame {
        group_id: update.chat_id(),
        user: update.from.clone(),
    };
    if route_to_game(&ctx, &update, command).await? {
        ctx.stats().record_player_joined();
    }
    Ok(())
}

pub async fn force_start(
    ctx: Arc<ControlContext>,
    update: Update,
    _args: Vec<String>,
) -> HandlerResult {
    let command = NodeCommand::ForceStart {
        group_id: update.chat_id(),
    };
    route_to_game(&ctx, &update, command).await?;
    Ok(())
}

/// Aborts the group's game and frees its slot, even if the node is gone.
pub async fn stop_game(
    ctx: Arc<ControlContext>,
    update: Update,
    _args: Vec<String>,
) -> HandlerResult {
    let group_id = update.chat_id();
    let Some(location) = ctx.pool().find_game(group_id).await else {
        ctx.reply(&update, NO_GAME_MESSAGE);
        return Ok(());
    };

    let node_id = location.node.id();
    if let Err(e) = location.node.route(NodeCommand::StopGame { group_id }) {
        warn!("Stop for group {} not delivered to node {}: {}", group_id, node_id, e);
    }
    if ctx.pool().release_game(node_id, group_id).await.is_none() {
        debug!("Game in group {} already left node {}", group_id, node_id);
    }
    info!("⏹️ Game in group {} stopped by user {}", group_id, update.sender_id());
    ctx.reply(&update, GAME_STOPPED_MESSAGE);
    Ok(())
}

/// Routes `command` to the group's node. Returns false when there is no game.
async fn route_to_game(
    ctx: &ControlContext,
    update: &Update,
    command: NodeCommand,
) -> Result<bool, HandlerError> {
    let Some(location) = ctx.pool().find_game(update.chat_id()).await else {
        ctx.reply(update, NO_GAME_MESSAGE);
        return Ok(false);
    };

    location.node.route(command).map_err(|e| {
        ctx.reply(update, NODE_UNREACHABLE_MESSAGE);
        HandlerError::from(e)
    })?;
    Ok(true)
}
