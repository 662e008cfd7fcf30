//! # Control Server - Werewolf Game Control Core
//!
//! The control service sits between the chat platform and a fleet of worker
//! nodes that actually run Werewolf games. It does not run games itself; it
//! decides where games run and routes chat commands to the right place.
//!
//! ## Architecture Overview
//!
//! ### Core Components
//!
//! * **Node Pool** ([`pool`]) - Registry of connected nodes and the games they
//!   host, with least-loaded selection and failover notices when a node dies
//! * **Command Registry** ([`commands`]) - Immutable table of triggers,
//!   permission flags and handlers built once at startup
//! * **Dispatcher** ([`dispatch`]) - Parses updates, applies blocking and role
//!   gates and runs handlers on their own tasks
//! * **Gateway** ([`gateway`]) - Receive loop with bounded backoff and an
//!   outbound message queue
//! * **Transport** ([`transport`]) - WebSocket connections from nodes
//!
//! ### Message Flow
//!
//! 1. The gateway yields a batch of updates
//! 2. Each update is routed by the dispatcher on its own task
//! 3. Handlers consult the pool and route commands to a node
//! 4. Replies are queued on the outbox and delivered in order
//!
//! ## Failure Handling
//!
//! * A node that disconnects is removed; every group it hosted is told the
//!   game was lost before the game is forgotten
//! * Handler errors and panics are logged at the dispatch boundary
//! * Transient gateway errors are retried with exponential backoff
//!
//! ## Thread Safety
//!
//! * The pool keeps nodes, games and the group index under one `RwLock`
//! * The command registry is read-only after construction
//! * Group admin lookups are cached in a `DashMap`

pub use config::{AccessConfig, BackoffConfig, ServerConfig};
pub use error::{
    GatewayError, HandlerError, PoolError, RegistryError, ServerError, TransportError,
};
pub use server::{ControlContext, ControlServer};
pub use shutdown::ShutdownState;
pub use stats::{ControlStats, StatsSnapshot};

pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod pool;
pub mod server;
pub mod shutdown;
pub mod stats;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
