//! Graceful shutdown management

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::time::sleep;
use tracing::info;

/// Granularity at which waiters notice a shutdown request
const CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Process-wide running flag
///
/// The flag is handed to the notification session as its shutdown flag,
/// so clearing it (Ctrl+C or [`ShutdownManager::trigger`]) stops both
/// the binary's loop and the session, which closes its socket with a
/// normal close frame.
pub struct ShutdownManager {
    running: Arc<AtomicBool>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Clear the flag on Ctrl+C
    pub fn spawn_signal_handler(&self) {
        let running = Arc::clone(&self.running);
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, closing notification session");
                running.store(false, Ordering::Release);
            }
        });
    }

    /// Request shutdown without a signal
    pub fn trigger(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Shared handle to the flag (`false` = stop)
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Resolve once shutdown is requested
    pub async fn stopped(&self) {
        while self.is_running() {
            sleep(CHECK_INTERVAL).await;
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}
