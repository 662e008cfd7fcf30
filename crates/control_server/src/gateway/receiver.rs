//! Update receive loop with bounded exponential backoff.

use super::ChatGateway;
use crate::config::BackoffConfig;
use crate::dispatch::Dispatcher;
use crate::error::GatewayError;
use crate::shutdown::ShutdownState;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Tracks consecutive receive failures and the delay before the next attempt.
#[derive(Debug, Clone)]
pub struct ReceiveBackoff {
    config: BackoffConfig,
    failures: u32,
}

impl ReceiveBackoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, failures: 0 }
    }

    /// Records a failed attempt.
    ///
    /// # Returns
    ///
    /// The delay to wait before retrying, doubling from the initial delay up to
    /// the configured maximum, or `None` once the failure limit is exceeded.
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);

        let limit = self.config.max_consecutive_failures;
        if limit > 0 && self.failures > limit {
            return None;
        }

        let exponent = (self.failures - 1).min(20);
        let delay = self
            .config
            .initial_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(self.config.max_backoff_ms);
        Some(Duration::from_millis(delay))
    }

    /// Resets the failure streak after a successful receive.
    pub fn record_success(&mut self) {
        if self.failures > 0 {
            info!("🔄 Update stream recovered after {} failed attempts", self.failures);
        }
        self.failures = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }
}

/// Pulls updates from the gateway and dispatches each one on its own task.
///
/// Transient gateway errors are retried with [`ReceiveBackoff`]. The loop
/// returns `Ok(())` when the gateway reports the stream closed or shutdown is
/// initiated.
///
/// # Errors
///
/// Returns [`GatewayError::RetriesExhausted`] once the configured number of
/// consecutive failures is exceeded.
pub async fn run_receive_loop(
    gateway: Arc<dyn ChatGateway>,
    dispatcher: Arc<Dispatcher>,
    config: BackoffConfig,
    shutdown: Option<ShutdownState>,
) -> Result<(), GatewayError> {
    let limit = config.max_consecutive_failures;
    let mut backoff = ReceiveBackoff::new(config);
    info!("📨 Receiving chat updates");

    loop {
        if shutdown.as_ref().is_some_and(|s| s.is_shutdown_initiated()) {
            info!("🛑 Receive loop stopping for shutdown");
            return Ok(());
        }

        match gateway.receive().await {
            Ok(updates) => {
                backoff.record_success();
                if !updates.is_empty() {
                    debug!("📥 Received {} updates", updates.len());
                }
                for update in updates {
                    let dispatcher = dispatcher.clone();
                    tokio::spawn(async move {
                        dispatcher.handle_update(update).await;
                    });
                }
            }
            Err(GatewayError::Closed) => {
                info!("📪 Update stream closed");
                return Ok(());
            }
            Err(e) => match backoff.record_failure() {
                Some(delay) => {
                    warn!(
                        "⚠️ Failed to receive updates (attempt {}): {} - retrying in {:?}",
                        backoff.consecutive_failures(),
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    error!("❌ Giving up on the update stream: {}", e);
                    return Err(GatewayError::RetriesExhausted(limit));
                }
            },
        }
    }
}
