//! Command handler implementations, grouped by audience.

pub mod admin;
pub mod game;
pub mod general;

/// Reply sent when a group has no game to act on.
pub const NO_GAME_MESSAGE: &str = "There is no game running here. Use /startgame to start one.";

/// Reply sent when the node owning a game cannot be reached.
pub const NODE_UNREACHABLE_MESSAGE: &str =
    "Could not reach the game server. Please try again in a moment.";
