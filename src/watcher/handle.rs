//! Cloneable handle over the orchestrator's event channel.
//!
//! All public operations are messages; the handle never touches state
//! directly. `built_handler` is the only suspending operation: it parks
//! on a oneshot reply until the entry point is fresh.

use std::path::PathBuf;

use anyhow::Result;
use tokio::sync::{mpsc, oneshot};

use super::messages::{BuiltHandler, RequestError, StateSnapshot, WatchEvent};

/// Handle to a running watcher.
#[derive(Clone)]
pub struct WatcherHandle {
    pub(super) tx: mpsc::Sender<WatchEvent>,
}

impl WatcherHandle {
    /// Get a built handler, waiting for the in-flight or pending rebuild
    /// when the entry point is dirty. The caller enforces its own
    /// timeout; the watcher never times the request out on its own.
    pub async fn built_handler(
        &self,
        src_path: &str,
        handler: &str,
    ) -> Result<BuiltHandler, RequestError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WatchEvent::Request {
                src_path: src_path.to_string(),
                handler: handler.to_string(),
                reply,
            })
            .await
            .map_err(|_| RequestError::Stopped)?;

        rx.await.map_err(|_| RequestError::Stopped)?
    }

    /// Forward the user's input key (deploy approval).
    pub async fn input(&self) {
        let _ = self.tx.send(WatchEvent::Input).await;
    }

    /// Snapshot of the orchestrator state.
    pub async fn state(&self) -> Result<StateSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WatchEvent::GetState(reply))
            .await
            .map_err(|_| anyhow::anyhow!("watcher stopped"))?;
        rx.await.map_err(|_| anyhow::anyhow!("watcher stopped"))
    }

    /// Inject a file-change batch, as the fs actor would.
    ///
    /// Used by hosts that run their own watcher and by tests.
    pub async fn notify_changed(&self, paths: Vec<PathBuf>) {
        let _ = self.tx.send(WatchEvent::PathsChanged(paths)).await;
    }

    /// Stop the watcher loop, killing live checker processes and
    /// rejecting outstanding requests.
    pub async fn stop(&self) {
        let _ = self.tx.send(WatchEvent::Shutdown).await;
    }
}
