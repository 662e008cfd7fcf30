//! # Werewolf Commands
//!
//! The built-in chat commands of the Werewolf control service, declared with
//! their permission flags and ready to hand to
//! [`ControlServer::new`](control_server::ControlServer::new).
//!
//! | Trigger      | Gates                          | Effect                               |
//! |--------------|--------------------------------|--------------------------------------|
//! | `startgame`  | group only, blockable          | place a new game on the best node    |
//! | `join`       | group only, blockable          | forward a join to the owning node    |
//! | `forcestart` | group only, group admin        | skip the join phase                  |
//! | `stopgame`   | group only, group admin        | abort the game and free the slot     |
//! | `ping`       |                                | reply with uptime                    |
//! | `help`       |                                | list commands                        |
//! | `nodes`      | developer                      | list node loads                      |
//! | `drain`      | developer                      | stop placing games on a node         |
//! | `stats`      | global admin                   | show activity counters               |

use control_server::commands::CommandDeclaration;

pub mod handlers;

/// Every built-in command declaration.
pub fn builtin_commands() -> Vec<CommandDeclaration> {
    use handlers::{admin, game, general};

    vec![
        CommandDeclaration::new("startgame", game::start_game)
            .in_group_only()
            .blockable(),
        CommandDeclaration::new("join", game::join_game)
            .in_group_only()
            .blockable(),
        CommandDeclaration::new("forcestart", game::force_start)
            .in_group_only()
            .group_admin_only(),
        CommandDeclaration::new("stopgame", game::stop_game)
            .in_group_only()
            .group_admin_only(),
        CommandDeclaration::new("ping", general::ping),
        CommandDeclaration::new("help", general::help),
        CommandDeclaration::new("nodes", admin::nodes).dev_only(),
        CommandDeclaration::new("drain", admin::drain).dev_only(),
        CommandDeclaration::new("stats", admin::stats).global_admin_only(),
    ]
}

#[cfg(test)]
mod tests;
