//! # Werewolf Control - Main Entry Point
//!
//! Control service for the Werewolf chat game: reads chat updates, routes
//! commands through permission gates, and places games on the least loaded
//! worker node.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration
//! werewolf-control
//!
//! # Specify custom configuration
//! werewolf-control --config production.toml
//!
//! # Override specific settings
//! werewolf-control --bind 0.0.0.0:9050 --max-games-per-node 40 --log-level debug
//! ```
//!
//! ## Configuration
//!
//! The service loads configuration from a TOML file (default: `config.toml`).
//! If the file doesn't exist, a default configuration will be created.
//!
//! ## I/O
//!
//! Chat updates arrive as JSON lines on stdin and outbound messages leave as
//! JSON lines on stdout. Logs go to stderr or the configured log file.
//!
//! ## Signal Handling
//!
//! The service shuts down gracefully on SIGINT (Ctrl+C) and SIGTERM, and
//! exits immediately on a second signal.

use tracing::error;

mod app;
mod cli;
mod config;
mod logging;
mod signals;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

/// Entry point called from `main`.
///
/// # Exit Codes
///
/// * **0**: Successful execution and shutdown
/// * **1**: Error during startup, configuration, or runtime
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Logging settings come from the file before the full load in `Application::new`.
    let config = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default();

    let mut logging_settings = config.logging;
    if let Some(level) = &args.log_level {
        logging_settings.level = level.clone();
    }

    if let Err(e) = logging::setup_logging(&logging_settings, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}

pub use config::{LoggingSettings, ServerSettings};
