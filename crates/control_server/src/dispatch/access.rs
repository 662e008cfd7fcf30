//! Sender roles and command blocking.

use super::update::{Update, UserId};
use crate::commands::Command;
use crate::config::AccessConfig;
use crate::gateway::ChatGateway;
use crate::pool::ChatId;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// What the sender of an update is allowed to do.
///
/// Roles nest: a developer counts as a global admin, and a global admin
/// counts as an admin of every group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderRole {
    pub developer: bool,
    pub global_admin: bool,
    pub group_admin: bool,
}

impl SenderRole {
    pub fn is_developer(&self) -> bool {
        self.developer
    }

    pub fn is_global_admin(&self) -> bool {
        self.developer || self.global_admin
    }

    pub fn is_group_admin(&self) -> bool {
        self.is_global_admin() || self.group_admin
    }
}

/// Decides who may run which command where.
#[async_trait]
pub trait AccessPolicy: Send + Sync {
    /// Whether a blockable command is disabled for the update's chat.
    fn is_blocked(&self, command: &Command, update: &Update) -> bool;

    /// Resolves the sender's role for the gates `command` carries.
    ///
    /// Implementations may skip lookups the command's flags do not need.
    async fn resolve_role(&self, update: &Update, command: &Command) -> SenderRole;
}

/// Access policy driven by configured id lists, with group admin status
/// looked up through the chat gateway and cached for a while.
pub struct StaticAccessPolicy {
    developers: HashSet<UserId>,
    global_admins: HashSet<UserId>,
    disabled_commands: HashSet<String>,
    blocked_chats: HashSet<ChatId>,
    gateway: Arc<dyn ChatGateway>,
    admin_cache: DashMap<(ChatId, UserId), (bool, Instant)>,
    cache_ttl: Duration,
}

impl StaticAccessPolicy {
    pub fn new(config: &AccessConfig, gateway: Arc<dyn ChatGateway>) -> Self {
        Self {
            developers: config.developer_ids.iter().copied().collect(),
            global_admins: config.global_admin_ids.iter().copied().collect(),
            disabled_commands: config
                .disabled_commands
                .iter()
                .map(|trigger| crate::commands::normalize_trigger(trigger.trim_start_matches('/')))
                .collect(),
            blocked_chats: config.blocked_chats.iter().copied().collect(),
            gateway,
            admin_cache: DashMap::new(),
            cache_ttl: Duration::from_secs(config.admin_cache_ttl_secs),
        }
    }

    async fn lookup_group_admin(&self, chat_id: ChatId, user_id: UserId) -> bool {
        let key = (chat_id, user_id);
        let cached = self.admin_cache.get(&key).map(|entry| *entry.value());
        if let Some((is_admin, checked_at)) = cached {
            if checked_at.elapsed() < self.cache_ttl {
                return is_admin;
            }
        }

        match self.gateway.is_chat_admin(chat_id, user_id).await {
            Ok(is_admin) => {
                debug!("Admin lookup for user {} in chat {}: {}", user_id, chat_id, is_admin);
                self.admin_cache.insert(key, (is_admin, Instant::now()));
                is_admin
            }
            Err(e) => {
                warn!(
                    "Admin lookup failed for user {} in chat {}: {}",
                    user_id, chat_id, e
                );
                false
            }
        }
    }
}

#[async_trait]
impl AccessPolicy for StaticAccessPolicy {
    fn is_blocked(&self, command: &Command, update: &Update) -> bool {
        self.blocked_chats.contains(&update.chat_id())
            || self.disabled_commands.contains(command.trigger())
    }

    async fn resolve_role(&self, update: &Update, command: &Command) -> SenderRole {
        let sender = update.sender_id();
        let mut role = SenderRole {
            developer: self.developers.contains(&sender),
            global_admin: self.global_admins.contains(&sender),
            group_admin: false,
        };

        if command.flags().group_admin_only && update.is_group() && !role.is_global_admin() {
            role.group_admin = self.lookup_group_admin(update.chat_id(), sender).await;
        }
        role
    }
}
