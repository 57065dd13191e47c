//! FileSystem Actor
//!
//! Bridges the platform watcher into the orchestrator's event channel.
//! The watcher attaches before the control loop starts consuming, so
//! events raised during the initial builds buffer instead of vanishing.
//!
//! ```text
//! notify ─► ChangeBatcher ─► WatchEvent::PathsChanged
//!    ▲
//!    └── WatchCmd (add/remove input files) from the orchestrator
//! ```

mod batch;
mod watch_set;

pub(crate) use watch_set::{WatchCmd, WatchSet};

use std::path::PathBuf;
use std::time::{Duration, Instant};

use notify::RecommendedWatcher;
use tokio::sync::mpsc;

use super::messages::WatchEvent;
use batch::ChangeBatcher;
use watch_set::WatchedPaths;

/// Idle repair cadence for the root watch and owed file watches.
const HOUSEKEEPING_TICK: Duration = Duration::from_secs(2);

/// FileSystem Actor - watches for file changes
pub(crate) struct FsActor {
    /// Channel to receive notify events (sync -> async bridge)
    notify_rx: std::sync::mpsc::Receiver<notify::Result<notify::Event>>,
    /// Watcher handle (must be kept alive)
    watcher: RecommendedWatcher,
    /// Root and per-file attachment bookkeeping
    watched: WatchedPaths,
    /// Add/remove commands from the orchestrator
    cmd_rx: mpsc::UnboundedReceiver<WatchCmd>,
    /// Channel to the orchestrator
    events_tx: mpsc::Sender<WatchEvent>,
    /// Burst folding and release timing
    batcher: ChangeBatcher,
}

impl FsActor {
    /// Create the actor and attach the watcher immediately; events
    /// buffer in the bridge channel while the caller finishes starting
    /// up.
    pub fn new(
        root: PathBuf,
        artifact_dir: PathBuf,
        initial_files: Vec<PathBuf>,
        events_tx: mpsc::Sender<WatchEvent>,
        cmd_rx: mpsc::UnboundedReceiver<WatchCmd>,
    ) -> notify::Result<Self> {
        // Sync channel for notify (it doesn't support async)
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();

        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })?;

        let mut watched = WatchedPaths::new(root);
        watched.tick(&mut watcher);
        watched.apply(&mut watcher, WatchCmd::Add(initial_files));

        Ok(Self {
            notify_rx,
            watcher,
            watched,
            cmd_rx,
            events_tx,
            batcher: ChangeBatcher::new(artifact_dir),
        })
    }

    /// Run the actor event loop.
    pub async fn run(self) {
        let notify_rx = self.notify_rx;
        let events_tx = self.events_tx;
        let mut watcher = self.watcher;
        let mut watched = self.watched;
        let mut cmd_rx = self.cmd_rx;
        let mut batcher = self.batcher;

        let (async_tx, mut async_rx) = mpsc::channel::<notify::Event>(64);

        // notify only knows callbacks; a bridge thread feeds its sync
        // channel into the async loop.
        std::thread::spawn(move || {
            while let Ok(result) = notify_rx.recv() {
                match result {
                    Ok(event) => {
                        if async_tx.blocking_send(event).is_err() {
                            break; // Receiver dropped
                        }
                    }
                    Err(e) => crate::log!("watch"; "notify error: {}", e),
                }
            }
        });

        loop {
            // Wake when the batch is due, or on the housekeeping tick
            // while nothing is pending.
            let wake = batcher
                .flush_at()
                .map(|due| due.saturating_duration_since(Instant::now()))
                .unwrap_or(HOUSEKEEPING_TICK);

            tokio::select! {
                biased;
                Some(event) = async_rx.recv() => batcher.observe(&event),
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    watched.apply(&mut watcher, cmd);
                }
                _ = tokio::time::sleep(wake) => {
                    watched.tick(&mut watcher);

                    let Some(paths) = batcher.drain(Instant::now()) else {
                        continue;
                    };
                    if events_tx.send(WatchEvent::PathsChanged(paths)).await.is_err() {
                        break; // Orchestrator shut down
                    }
                }
            }
        }
    }
}
