//! Error types and handling for the control server.
//!
//! Each concern gets its own enum so callers can tell configuration faults
//! (which must stop the process) apart from the expected, recoverable outcomes
//! of routing and node management.

use crate::pool::{ChatId, NodeId};

/// Enumeration of possible server errors.
///
/// Categorizes errors into network-related, configuration and internal
/// failures to help with debugging and startup error reporting.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Network-related errors such as binding failures or connection issues
    #[error("Network error: {0}")]
    Network(String),

    /// The command table or configuration is unusable; the process must not start
    #[error("Configuration error: {0}")]
    Configuration(#[from] RegistryError),

    /// The chat gateway stopped delivering updates and could not be recovered
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised while building the command registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate command trigger '{0}'")]
    DuplicateTrigger(String),

    #[error("invalid command trigger '{0}'")]
    InvalidTrigger(String),
}

/// Errors raised by node pool mutations.
///
/// Capacity exhaustion and routing misses are not errors; selection and lookup
/// report them as `None`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("node {0} is already registered")]
    DuplicateNode(NodeId),

    #[error("node {0} was removed and cannot rejoin")]
    NodeRetired(NodeId),

    #[error("node {0} is not in the pool")]
    NodeNotFound(NodeId),

    #[error("group {0} already has an active game")]
    GameAlreadyActive(ChatId),
}

/// Errors returned by command handlers.
///
/// These never leave the dispatcher; they are logged at the dispatch boundary.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Other(String),
}

/// Errors reported by the chat gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("receive failed: {0}")]
    Receive(String),

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("update stream closed")]
    Closed,

    #[error("gave up after {0} consecutive receive failures")]
    RetriesExhausted(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised when routing traffic to a node.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("node {0} is disconnected")]
    Disconnected(NodeId),

    #[error("failed to encode node message: {0}")]
    Encode(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        TransportError::Encode(e.to_string())
    }
}
