//! Change batching for the fs actor.
//!
//! Editors and build tools rarely produce one clean event per save: a
//! single write shows up as a burst of creates, writes, and renames,
//! often with scratch files mixed in, and the bundler drops artifacts
//! inside the watched root while a build is still running. The batcher
//! folds a burst into one net change per path and releases the batch
//! once the stream has been quiet for a short window - or once the batch
//! has aged past the staleness cap, so a steady drip of events cannot
//! starve rebuilds indefinitely.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use crate::utils::normalize_path;

/// How long the event stream must stay quiet before a batch releases.
pub(super) const QUIET_WINDOW: Duration = Duration::from_millis(250);
/// Upper bound on how long a batch may keep accumulating.
pub(super) const MAX_BATCH_AGE: Duration = Duration::from_millis(1500);

/// Net effect of a burst of events on one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FileChange {
    Added,
    Edited,
    Deleted,
}

/// Fold a new observation into the recorded one. `None` cancels the
/// entry: a file that appeared and vanished within one batch never
/// existed as far as rebuilds are concerned.
fn fold(recorded: FileChange, incoming: FileChange) -> Option<FileChange> {
    use FileChange::*;
    match (recorded, incoming) {
        (Added, Deleted) => None,
        (Edited | Deleted, Deleted) => Some(Deleted),
        // Delete followed by re-create is an edit: the path is back on
        // disk, contents presumed new.
        (Deleted, Added | Edited) => Some(Edited),
        (Added, Added | Edited) => Some(Added),
        (Edited, Added | Edited) => Some(Edited),
    }
}

pub(super) struct ChangeBatcher {
    /// Our own artifact tree; bundler output must not feed back into
    /// rebuilds.
    ignore_dir: PathBuf,
    pending: FxHashMap<PathBuf, FileChange>,
    /// When the current batch started accumulating.
    opened: Option<Instant>,
    /// When the last event landed.
    last_seen: Option<Instant>,
}

impl ChangeBatcher {
    pub(super) fn new(ignore_dir: PathBuf) -> Self {
        Self {
            ignore_dir,
            pending: FxHashMap::default(),
            opened: None,
            last_seen: None,
        }
    }

    /// Record one notify event.
    pub(super) fn observe(&mut self, event: &notify::Event) {
        let Some(change) = classify(event) else {
            return;
        };

        let now = Instant::now();
        for path in &event.paths {
            let path = normalize_path(path);
            if self.ignored(&path) {
                continue;
            }

            let folded = match self.pending.get(&path) {
                Some(&recorded) => fold(recorded, change),
                None => Some(change),
            };
            match folded {
                Some(change) => {
                    crate::debug!("watch"; "{:?}: {}", change, path.display());
                    self.pending.insert(path, change);
                }
                None => {
                    self.pending.remove(&path);
                }
            }

            self.opened.get_or_insert(now);
            self.last_seen = Some(now);
        }

        if self.pending.is_empty() {
            // Everything cancelled out; the next event opens a fresh batch.
            self.opened = None;
            self.last_seen = None;
        }
    }

    fn ignored(&self, path: &Path) -> bool {
        path.starts_with(&self.ignore_dir) || is_scratch(path)
    }

    /// Earliest instant at which the current batch may release, or
    /// `None` while nothing is pending.
    pub(super) fn flush_at(&self) -> Option<Instant> {
        if self.pending.is_empty() {
            return None;
        }
        let quiet = self.last_seen? + QUIET_WINDOW;
        let cap = self.opened? + MAX_BATCH_AGE;
        Some(quiet.min(cap))
    }

    /// Hand over the batch if its release time has passed.
    pub(super) fn drain(&mut self, now: Instant) -> Option<Vec<PathBuf>> {
        let due = self.flush_at()?;
        if now < due {
            return None;
        }
        self.opened = None;
        self.last_seen = None;
        let batch = std::mem::take(&mut self.pending);
        Some(batch.into_keys().collect())
    }
}

/// Map a notify event to a change, dropping the kinds rebuilds cannot
/// care about: metadata-only touches and access notifications.
fn classify(event: &notify::Event) -> Option<FileChange> {
    use notify::EventKind;
    match event.kind {
        EventKind::Create(_) => Some(FileChange::Added),
        EventKind::Remove(_) => Some(FileChange::Deleted),
        EventKind::Modify(notify::event::ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(FileChange::Edited),
        _ => None,
    }
}

/// Editor scratch output: swap/backup artifacts and hidden files.
fn is_scratch(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if name.starts_with('.') || name.ends_with('~') {
        return true;
    }
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    matches!(ext, "swp" | "swo" | "swx" | "tmp" | "bak" | "orig" | "part")
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn event(paths: Vec<&str>, kind: notify::EventKind) -> notify::Event {
        notify::Event {
            kind,
            paths: paths.into_iter().map(PathBuf::from).collect(),
            attrs: Default::default(),
        }
    }

    fn created() -> notify::EventKind {
        notify::EventKind::Create(notify::event::CreateKind::File)
    }

    fn written() -> notify::EventKind {
        notify::EventKind::Modify(notify::event::ModifyKind::Data(
            notify::event::DataChange::Any,
        ))
    }

    fn removed() -> notify::EventKind {
        notify::EventKind::Remove(notify::event::RemoveKind::File)
    }

    fn batcher() -> ChangeBatcher {
        ChangeBatcher::new(PathBuf::from("/app/.strato"))
    }

    #[test]
    fn test_fold_create_then_delete_cancels() {
        assert_eq!(fold(FileChange::Added, FileChange::Deleted), None);
    }

    #[test]
    fn test_fold_delete_then_create_is_edit() {
        assert_eq!(
            fold(FileChange::Deleted, FileChange::Added),
            Some(FileChange::Edited)
        );
    }

    #[test]
    fn test_fold_edit_then_delete_is_delete() {
        assert_eq!(
            fold(FileChange::Edited, FileChange::Deleted),
            Some(FileChange::Deleted)
        );
    }

    #[test]
    fn test_fold_create_then_edit_stays_added() {
        assert_eq!(
            fold(FileChange::Added, FileChange::Edited),
            Some(FileChange::Added)
        );
    }

    #[test]
    fn test_observe_folds_burst_per_path() {
        let mut batcher = batcher();
        batcher.observe(&event(vec!["/tmp/a.ts"], created()));
        batcher.observe(&event(vec!["/tmp/a.ts"], written()));
        batcher.observe(&event(vec!["/tmp/b.ts"], written()));

        assert_eq!(batcher.pending.len(), 2);
        assert_eq!(
            batcher.pending[&PathBuf::from("/tmp/a.ts")],
            FileChange::Added
        );
    }

    #[test]
    fn test_cancelled_batch_resets_clock() {
        let mut batcher = batcher();
        batcher.observe(&event(vec!["/tmp/a.ts"], created()));
        batcher.observe(&event(vec!["/tmp/a.ts"], removed()));

        assert!(batcher.pending.is_empty());
        assert!(batcher.opened.is_none());
        assert_eq!(batcher.flush_at(), None);
    }

    #[test]
    fn test_scratch_files_ignored() {
        let mut batcher = batcher();
        batcher.observe(&event(vec!["/tmp/.api.ts.swp"], written()));
        batcher.observe(&event(vec!["/tmp/api.ts~"], written()));
        batcher.observe(&event(vec!["/tmp/api.ts.bak"], written()));

        assert!(batcher.pending.is_empty());
        assert_eq!(batcher.flush_at(), None);
    }

    #[test]
    fn test_artifact_dir_ignored() {
        let mut batcher = batcher();
        batcher.observe(&event(vec!["/app/.strato/handlers/x/index.js"], written()));

        assert!(batcher.pending.is_empty());
    }

    #[test]
    fn test_metadata_touch_ignored() {
        let mut batcher = batcher();
        batcher.observe(&event(
            vec!["/tmp/a.ts"],
            notify::EventKind::Modify(notify::event::ModifyKind::Metadata(
                notify::event::MetadataKind::Any,
            )),
        ));
        assert!(batcher.pending.is_empty());
    }

    #[test]
    fn test_flush_waits_for_quiet_window() {
        let mut batcher = batcher();
        batcher.observe(&event(vec!["/tmp/a.ts"], written()));

        let now = Instant::now();
        assert!(batcher.drain(now).is_none());

        let due = batcher.flush_at().unwrap();
        assert!(due > now);
        assert!(due <= now + QUIET_WINDOW + Duration::from_millis(10));

        let batch = batcher.drain(due).expect("due batch releases");
        assert_eq!(batch, vec![PathBuf::from("/tmp/a.ts")]);
        assert_eq!(batcher.flush_at(), None);
    }

    #[test]
    fn test_steady_events_cannot_starve_the_batch() {
        let mut batcher = batcher();
        batcher.observe(&event(vec!["/tmp/a.ts"], written()));

        // Simulate a batch that has been accumulating for the full cap
        // while events keep arriving.
        let opened = Instant::now() - MAX_BATCH_AGE;
        batcher.opened = Some(opened);
        batcher.last_seen = Some(Instant::now());

        let due = batcher.flush_at().unwrap();
        assert!(due <= opened + MAX_BATCH_AGE);
        assert!(batcher.drain(Instant::now()).is_some());
    }

    #[test]
    fn test_drain_empty_is_none() {
        let mut batcher = batcher();
        assert!(batcher.drain(Instant::now()).is_none());
    }
}
