//! Watch-set maintenance.
//!
//! The orchestrator side ([`WatchSet`]) batches add/remove commands for
//! watched input files and hands them to the fs actor; the orchestrator
//! issues the batch before waking waiters or advancing state. The
//! fs-actor side ([`WatchedPaths`]) keeps the notify watcher consistent
//! with what the orchestrator asked for.
//!
//! Attachment is two-tier. The application root is one recursive watch:
//! it covers go sources, infra files, and anything a build may start
//! reading tomorrow. Input files living outside the root (monorepo
//! siblings, linked packages) get individual non-recursive watches as
//! builds discover them. Either tier can drop out from under us - a
//! branch switch can delete and recreate the root, and a bundler
//! metafile can name a file an instant before it lands on disk - so
//! attachment is repaired on every housekeeping tick rather than treated
//! as permanent.

use std::path::{Path, PathBuf};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use tokio::sync::mpsc;

/// Command to the fs actor's watcher.
#[derive(Debug)]
pub(crate) enum WatchCmd {
    Add(Vec<PathBuf>),
    Remove(Vec<PathBuf>),
}

/// Orchestrator-side handle. Disabled in test mode: every operation is a
/// no-op when no watcher is installed.
pub(crate) struct WatchSet {
    tx: Option<mpsc::UnboundedSender<WatchCmd>>,
}

impl WatchSet {
    pub fn new(tx: mpsc::UnboundedSender<WatchCmd>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn add(&self, files: Vec<PathBuf>) {
        if files.is_empty() {
            return;
        }
        if let Some(tx) = &self.tx {
            let _ = tx.send(WatchCmd::Add(files));
        }
    }

    pub fn remove(&self, files: Vec<PathBuf>) {
        if files.is_empty() {
            return;
        }
        if let Some(tx) = &self.tx {
            let _ = tx.send(WatchCmd::Remove(files));
        }
    }
}

// =============================================================================
// Fs-actor side
// =============================================================================

/// Everything the notify watcher should currently be attached to.
pub(super) struct WatchedPaths {
    root: PathBuf,
    root_attached: bool,
    /// Outside-root input files with a live watch.
    attached: FxHashSet<PathBuf>,
    /// Outside-root input files we still owe a watch; attach usually
    /// fails because the file is not on disk yet.
    pending: FxHashSet<PathBuf>,
}

impl WatchedPaths {
    pub(super) fn new(root: PathBuf) -> Self {
        Self {
            root,
            root_attached: false,
            attached: FxHashSet::default(),
            pending: FxHashSet::default(),
        }
    }

    /// A file under the recursive root rides that watch for free; only
    /// paths outside it need their own registration.
    fn covered_by_root(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }

    pub(super) fn apply(&mut self, watcher: &mut RecommendedWatcher, cmd: WatchCmd) {
        match cmd {
            WatchCmd::Add(files) => {
                for file in files {
                    if self.covered_by_root(&file) || self.attached.contains(&file) {
                        continue;
                    }
                    self.attach_file(watcher, file);
                }
            }
            WatchCmd::Remove(files) => {
                for file in files {
                    self.pending.remove(&file);
                    if self.attached.remove(&file) {
                        let _ = watcher.unwatch(&file);
                    }
                }
            }
        }
    }

    /// Periodic repair. Restores the root watch after a delete/recreate
    /// cycle and retries owed file watches now that the files may exist.
    /// Failures stay non-fatal: a lost watch costs freshness, not
    /// correctness, and the next tick tries again.
    pub(super) fn tick(&mut self, watcher: &mut RecommendedWatcher) {
        if self.root_attached && !self.root.exists() {
            self.root_attached = false;
        }
        if !self.root_attached
            && self.root.exists()
            && watcher.watch(&self.root, RecursiveMode::Recursive).is_ok()
        {
            self.root_attached = true;
            crate::debug!("watch"; "root watch attached: {}", self.root.display());
        }

        let retry: Vec<PathBuf> = self.pending.drain().collect();
        for file in retry {
            self.attach_file(watcher, file);
        }
    }

    fn attach_file(&mut self, watcher: &mut RecommendedWatcher, file: PathBuf) {
        match watcher.watch(&file, RecursiveMode::NonRecursive) {
            Ok(()) => {
                self.attached.insert(file);
            }
            Err(e) => {
                crate::debug!("watch"; "watch owed for {} ({}), retrying later", file.display(), e);
                self.pending.insert(file);
            }
        }
    }
}
