//! Process-wide shutdown state.
//!
//! A single Ctrl+C handler sets the shutdown flag and notifies the watch
//! loop over a crossbeam channel registered at startup.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shutdown has been requested (Ctrl+C received)
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Shutdown signal sender for the watch loop
static SHUTDOWN_TX: OnceLock<crossbeam::channel::Sender<()>> = OnceLock::new();

/// Setup the global Ctrl+C handler. Call once at program start.
///
/// Before `register_shutdown_channel()` the process exits immediately;
/// after it, the watch loop is notified and drains gracefully.
pub fn setup_shutdown_handler() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        SHUTDOWN.store(true, Ordering::SeqCst);

        if let Some(tx) = SHUTDOWN_TX.get() {
            let _ = tx.send(());
        } else {
            std::process::exit(0);
        }
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {}", e))
}

/// Register the channel the Ctrl+C handler signals.
pub fn register_shutdown_channel(tx: crossbeam::channel::Sender<()>) {
    let _ = SHUTDOWN_TX.set(tx);
}

/// Check if shutdown has been requested.
pub fn is_shutdown() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}
