//! Declarative command routing.
//!
//! Handlers are declared with a trigger and permission flags, then collected
//! into an immutable [`CommandRegistry`] at startup.

pub mod parse;
pub mod registry;

pub use parse::{normalize_trigger, parse_command, ParsedCommand};
pub use registry::{
    Command, CommandDeclaration, CommandFlags, CommandHandler, CommandRegistry,
    CommandRegistryBuilder, HandlerResult,
};
