//! Shutdown state.
//!
//! Two flags:
//! - `WATCHING`: a watch loop is running and will stop on its own
//! - `SHUTDOWN`: Ctrl+C was received

use std::sync::LazyLock;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// A watch loop is running and listens for shutdown
static WATCHING: AtomicBool = AtomicBool::new(false);

/// Shutdown has been requested (Ctrl+C received)
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Wakes the watch loop on shutdown
static SHUTDOWN_NOTIFY: LazyLock<Notify> = LazyLock::new(Notify::new);

/// Setup the global Ctrl+C handler. Call once at program start
///
/// - Watch loop running: graceful shutdown, the loop returns
/// - Otherwise: exit immediately, nothing needs cleanup
pub fn setup_shutdown_handler() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        if WATCHING.load(Ordering::SeqCst) {
            crate::log!("watch"; "shutting down...");
            request_shutdown();
        } else {
            std::process::exit(130);
        }
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {}", e))
}

/// Mark the watch loop as running (or stopped).
pub fn set_watching(watching: bool) {
    WATCHING.store(watching, Ordering::SeqCst);
}

fn request_shutdown() {
    SHUTDOWN.store(true, Ordering::SeqCst);
    // notify_one keeps a permit if nobody is waiting yet
    SHUTDOWN_NOTIFY.notify_one();
}

/// Check if shutdown has been requested
pub fn is_shutdown() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}

/// Resolves once shutdown has been requested.
pub async fn shutdown_requested() {
    if is_shutdown() {
        return;
    }
    SHUTDOWN_NOTIFY.notified().await;
}
