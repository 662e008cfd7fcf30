//! Control server orchestration.
//!
//! This module contains the server struct, the context handlers receive and
//! the loop that applies node lifecycle events to the pool.

pub mod context;
pub mod core;
pub mod lifecycle;

pub use context::ControlContext;
pub use core::ControlServer;
pub use lifecycle::{apply_node_event, run_node_events};
