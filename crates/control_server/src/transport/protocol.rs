//! Message types exchanged with worker nodes.
//!
//! Every message is a JSON object tagged by its `type` field, for example:
//!
//! ```json
//! { "type": "start_game", "group_id": -1001234, "chat_title": "Village", "initiator": { "id": 42, "first_name": "Ana" } }
//! ```

use crate::dispatch::User;
use crate::pool::ChatId;
use serde::{Deserialize, Serialize};

/// Commands the control service routes to a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeCommand {
    /// Start a new game session for the group
    StartGame {
        group_id: ChatId,
        chat_title: Option<String>,
        initiator: User,
    },
    /// Add a player to the group's game
    JoinGame { group_id: ChatId, user: User },
    /// Skip the join phase and begin immediately
    ForceStart { group_id: ChatId },
    /// Abort the group's game
    StopGame { group_id: ChatId },
}

/// Reports a node sends to the control service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeReport {
    /// Sent once after connecting
    Hello { version: String },
    /// A game finished and the node no longer owns the group
    GameEnded { group_id: ChatId },
    /// The node stops taking new games and will disconnect when idle
    ShuttingDown,
}
