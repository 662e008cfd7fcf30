//! Server configuration types and defaults.
//!
//! This module contains the configuration structures used to initialize the
//! control server: node listener settings, pool capacity, access control and
//! the receive loop's backoff policy.

use crate::dispatch::UserId;
use crate::pool::ChatId;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Configuration structure for the control server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The socket address worker nodes connect to
    pub node_bind_address: SocketAddr,

    /// Maximum number of games the pool places on a single node
    pub max_games_per_node: usize,

    /// Bot username used to filter `/command@bot` mentions
    pub bot_username: Option<String>,

    /// Interval in seconds between pool health reports (0 to disable)
    pub stats_interval_secs: u64,

    /// Chat that receives node connect and disconnect notices
    #[serde(default)]
    pub operator_chat_id: Option<ChatId>,

    /// Permission and blocking settings
    pub access: AccessConfig,

    /// Backoff policy for restarting the update receive loop
    pub receive: BackoffConfig,
}

/// Who may run gated commands and where blockable commands are disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Users allowed to run developer-only commands
    #[serde(default)]
    pub developer_ids: Vec<UserId>,

    /// Users allowed to run global-admin-only commands
    #[serde(default)]
    pub global_admin_ids: Vec<UserId>,

    /// Blockable commands disabled everywhere
    #[serde(default)]
    pub disabled_commands: Vec<String>,

    /// Chats in which every blockable command is disabled
    #[serde(default)]
    pub blocked_chats: Vec<ChatId>,

    /// Answer permission denials with a short message instead of staying silent
    #[serde(default)]
    pub reply_on_denied: bool,

    /// How long a group admin lookup stays cached, in seconds
    #[serde(default = "default_admin_cache_ttl_secs")]
    pub admin_cache_ttl_secs: u64,
}

/// Exponential backoff applied when the chat gateway fails to deliver updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay after the first failure, in milliseconds
    pub initial_backoff_ms: u64,

    /// Upper bound for the delay, in milliseconds
    pub max_backoff_ms: u64,

    /// Consecutive failures tolerated before giving up (0 for unlimited)
    pub max_consecutive_failures: u32,
}

fn default_admin_cache_ttl_secs() -> u64 {
    300
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            node_bind_address: SocketAddr::from(([127, 0, 0, 1], 9050)),
            max_games_per_node: 50,
            bot_username: None,
            stats_interval_secs: 60,
            operator_chat_id: None,
            access: AccessConfig::default(),
            receive: BackoffConfig::default(),
        }
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            developer_ids: Vec::new(),
            global_admin_ids: Vec::new(),
            disabled_commands: Vec::new(),
            blocked_chats: Vec::new(),
            reply_on_denied: false,
            admin_cache_ttl_secs: default_admin_cache_ttl_secs(),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            max_consecutive_failures: 0,
        }
    }
}
