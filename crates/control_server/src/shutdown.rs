//! Two-phase shutdown flag shared across the service.
//!
//! *Initiated* is raised by the signal handler, or by the server itself when
//! the update stream ends. The accept and receive loops stop taking new work
//! and the delivery task starts flushing the outbox. *Complete* is raised by
//! the delivery task once everything queued before that point has been
//! handed to the gateway, after which the process may exit without losing
//! replies.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Default)]
pub struct ShutdownState {
    initiated: Arc<AtomicBool>,
    complete: Arc<AtomicBool>,
}

impl ShutdownState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.initiated.load(Ordering::Acquire)
    }

    pub fn is_shutdown_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    /// Raises the initiated flag. Only the first call logs.
    pub fn initiate_shutdown(&self) {
        if !self.initiated.swap(true, Ordering::AcqRel) {
            info!("🛑 Shutdown initiated - no new updates will be processed");
        }
    }

    /// Raises the complete flag (and the initiated one, if still clear).
    pub fn complete_shutdown(&self) {
        self.initiate_shutdown();
        if !self.complete.swap(true, Ordering::AcqRel) {
            info!("✅ Outbox flushed - ready for final cleanup");
        }
    }

    /// Resolves once shutdown has been initiated.
    pub async fn initiated(&self) {
        while !self.is_shutdown_initiated() {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Resolves once shutdown is complete.
    pub async fn completed(&self) {
        while !self.is_shutdown_complete() {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}
