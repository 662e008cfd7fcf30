//! Configuration management for the Werewolf control service.
//!
//! This module handles loading, validation, and conversion of the service
//! configuration from TOML files and command-line arguments.

use control_server::{AccessConfig, BackoffConfig, ServerConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

fn default_stats_interval_secs() -> u64 {
    60
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Node listener and pool settings
    pub server: ServerSettings,
    /// Command permissions and blocking
    #[serde(default)]
    pub access: AccessConfig,
    /// Chat gateway receive backoff
    #[serde(default)]
    pub gateway: BackoffConfig,
    /// Logging configuration settings
    pub logging: LoggingSettings,
}

/// Server-specific configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Address worker nodes connect to (e.g., "0.0.0.0:9050")
    pub node_bind_address: String,
    /// Most games placed on one node
    pub max_games_per_node: usize,
    /// Bot username for `/command@bot` filtering
    #[serde(default)]
    pub bot_username: Option<String>,
    /// Seconds between pool health reports (0 disables them)
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
    /// Chat told about nodes connecting and disconnecting
    #[serde(default)]
    pub operator_chat_id: Option<i64>,
}

/// Logging configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
    /// Append logs to this file instead of stderr
    pub file_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                node_bind_address: "127.0.0.1:9050".to_string(),
                max_games_per_node: 50,
                bot_username: None,
                stats_interval_secs: default_stats_interval_secs(),
                operator_chat_id: None,
            },
            access: AccessConfig::default(),
            gateway: BackoffConfig::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
                file_path: None,
            },
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the
    /// specified path and returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or written, or does not
    /// parse as TOML.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Converts the application configuration to the control server's.
    pub fn to_server_config(&self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        Ok(ServerConfig {
            node_bind_address: self.server.node_bind_address.parse()?,
            max_games_per_node: self.server.max_games_per_node,
            bot_username: self.server.bot_username.clone(),
            stats_interval_secs: self.server.stats_interval_secs,
            operator_chat_id: self.server.operator_chat_id,
            access: self.access.clone(),
            receive: self.gateway.clone(),
        })
    }

    /// Validates the configuration settings.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is usable, or an error message naming
    /// the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self
            .server
            .node_bind_address
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(format!(
                "Invalid node bind address: {}",
                &self.server.node_bind_address
            ));
        }

        if self.server.max_games_per_node == 0 {
            return Err("server.max_games_per_node must be greater than 0".to_string());
        }

        if let Some(name) = &self.server.bot_username {
            if name.trim_start_matches('@').trim().is_empty() {
                return Err("server.bot_username cannot be empty".to_string());
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        if self.gateway.initial_backoff_ms == 0 {
            return Err("gateway.initial_backoff_ms must be greater than 0".to_string());
        }
        if self.gateway.initial_backoff_ms > self.gateway.max_backoff_ms {
            return Err(
                "gateway.initial_backoff_ms must not exceed gateway.max_backoff_ms".to_string(),
            );
        }

        if let Some(trigger) = self
            .access
            .disabled_commands
            .iter()
            .find(|trigger| trigger.trim_start_matches('/').trim().is_empty())
        {
            return Err(format!("Invalid disabled command: {:?}", trigger));
        }

        Ok(())
    }
}
