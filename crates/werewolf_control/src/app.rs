//! Main application logic and lifecycle management.
//!
//! This module contains the `Application` struct that wires the control
//! server to the stdio chat gateway and the built-in Werewolf commands,
//! then drives startup and graceful shutdown.

use crate::{
    cli::CliArgs,
    config::AppConfig,
    logging::display_banner,
    signals::{setup_signal_handlers, setup_signal_handlers_silent},
};
use control_server::gateway::StdioGateway;
use control_server::{ControlContext, ControlServer, ShutdownState};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Owns the merged configuration and the control server it built.
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
    /// Control server instance
    server: ControlServer,
}

impl Application {
    /// Creates a new application instance.
    ///
    /// # Arguments
    ///
    /// * `args` - Parsed command-line arguments
    ///
    /// # Process
    ///
    /// 1. Load configuration from file (creating default if missing)
    /// 2. Apply command-line argument overrides
    /// 3. Validate merged configuration
    /// 4. Display startup banner
    /// 5. Build the control server with the built-in command table
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        apply_overrides(&mut config, args);

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        display_banner();

        let server_config = config.to_server_config()?;
        let gateway = Arc::new(StdioGateway::new());
        let server = ControlServer::new(
            server_config,
            gateway,
            werewolf_commands::builtin_commands(),
        )?;

        Ok(Self { config, server })
    }

    /// Runs the server until the update stream ends or a termination signal
    /// arrives, then shuts down in phases.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting Werewolf control service");
        self.log_configuration_summary();

        let context = self.server.context();
        let shutdown_state = ShutdownState::new();
        let shutdown_state_for_server = shutdown_state.clone();

        let mut server_handle = {
            let server = self.server;
            tokio::spawn(async move {
                server
                    .start_with_shutdown_state(shutdown_state_for_server)
                    .await
            })
        };

        info!(
            "✅ Ready for game nodes on {}",
            self.config.server.node_bind_address
        );
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        tokio::select! {
            signal = setup_signal_handlers() => {
                signal?;
            }
            result = &mut server_handle => {
                // Update stream closed or the server failed on its own.
                report_flush(&shutdown_state);
                log_final_statistics(&context).await;
                return match result {
                    Ok(Ok(())) => {
                        info!("✅ Server completed successfully");
                        Ok(())
                    }
                    Ok(Err(e)) => {
                        error!("❌ Server error: {}", e);
                        Err(e.into())
                    }
                    Err(e) => Err(format!("Server task failed: {e}").into()),
                };
            }
        }

        tokio::spawn(async move {
            if let Err(e) = setup_signal_handlers_silent().await {
                error!("Failed to set up merciless shutdown signal handler: {e}");
                return;
            }

            warn!("Shutdown handler received again! I'll make this quick.");
            std::process::exit(1);
        });

        info!("📡 Phase 1: Stopping update intake and node listener...");
        shutdown_state.initiate_shutdown();

        info!("⏳ Phase 2: Waiting for the server task to finish...");
        let finished =
            tokio::time::timeout(tokio::time::Duration::from_secs(8), &mut server_handle).await;
        match finished {
            Ok(Ok(Ok(()))) => info!("✅ Server task completed gracefully"),
            Ok(Ok(Err(e))) => warn!("⚠️ Server stopped with error during shutdown: {}", e),
            Ok(Err(e)) => warn!("⚠️ Server task failed during shutdown: {}", e),
            Err(_) => {
                warn!("⏰ Server task did not complete within timeout, aborting");
                server_handle.abort();
            }
        }
        report_flush(&shutdown_state);

        log_final_statistics(&context).await;
        info!("👋 Werewolf control shutdown complete");

        Ok(())
    }

    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  🌐 Node bind address: {}", self.config.server.node_bind_address);
        info!("  🎲 Max games per node: {}", self.config.server.max_games_per_node);
        info!(
            "  🤖 Bot username: {}",
            self.config.server.bot_username.as_deref().unwrap_or("(any)")
        );
        info!(
            "  🛡️ Developers: {} | Global admins: {} | Blocked chats: {}",
            self.config.access.developer_ids.len(),
            self.config.access.global_admin_ids.len(),
            self.config.access.blocked_chats.len()
        );
        if !self.config.access.disabled_commands.is_empty() {
            info!(
                "  🚫 Disabled commands: {}",
                self.config.access.disabled_commands.join(", ")
            );
        }
    }
}

fn apply_overrides(config: &mut AppConfig, args: CliArgs) {
    if let Some(bind_address) = args.bind_address {
        config.server.node_bind_address = bind_address;
    }

    if let Some(log_level) = args.log_level {
        config.logging.level = log_level;
    }

    if let Some(max_games) = args.max_games_per_node {
        config.server.max_games_per_node = max_games;
    }

    if args.json_logs {
        config.logging.json_format = true;
    }
}

async fn log_final_statistics(context: &Arc<ControlContext>) {
    let stats = context.stats().snapshot();
    info!("📊 Final Statistics:");
    info!("  - Uptime: {}s", context.uptime().as_secs());
    info!("  - Nodes still connected: {}", context.pool().len().await);
    info!("  - Updates received: {}", stats.updates_received);
    info!("  - Commands dispatched: {}", stats.commands_dispatched);
    info!("  - Commands denied: {}", stats.commands_denied);
    info!("  - Handler failures: {}", stats.handler_failures);
    info!("  - Games started: {}", stats.games_started);
    info!("  - Players joined: {}", stats.players_joined);
    info!(
        "  - Nodes lost: {} ({} games)",
        stats.nodes_lost, stats.games_lost
    );
}

/// The server raises the complete flag once its outbox has been flushed.
fn report_flush(shutdown_state: &ShutdownState) {
    if shutdown_state.is_shutdown_complete() {
        info!("✅ All queued replies were delivered");
    } else {
        warn!("⚠️ Exiting before queued replies were delivered");
    }
}
