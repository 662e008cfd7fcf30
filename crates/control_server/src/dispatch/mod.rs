//! Update routing.
//!
//! Every inbound [`Update`] goes through the [`Dispatcher`]: the text is parsed
//! into a trigger, looked up in the command registry, checked against the
//! command's gates by the [`AccessPolicy`] and, if allowed, handed to the
//! handler on its own task.

pub mod access;
pub mod dispatcher;
pub mod update;

pub use access::{AccessPolicy, SenderRole, StaticAccessPolicy};
pub use dispatcher::{DenyReason, DispatchOutcome, Dispatcher, IgnoreReason};
pub use update::{Chat, ChatKind, Update, User, UserId};
