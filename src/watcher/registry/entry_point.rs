//! Per-handler entry-point record.

use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

use rustc_hash::FxHashSet;
use tokio::sync::oneshot;

use crate::build::{BuildRequest, BuiltArtifact};
use crate::config::{AppConfig, HandlerConfig};
use crate::core::{RebuildPriority, RuntimeKind};
use crate::utils::hash::fingerprint;
use crate::watcher::messages::{BuiltHandler, RequestError};

/// Key of an entry point: the `(src_path, handler)` pair joined by `|`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryPointKey(String);

impl EntryPointKey {
    pub fn new(src_path: &str, handler: &str) -> Self {
        Self(format!("{src_path}|{handler}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryPointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One-shot waiter woken when the next successful build completes
/// (or rejected on failure).
pub(crate) type Waiter = oneshot::Sender<Result<BuiltHandler, RequestError>>;

/// Per-handler record. Created at startup from the configured handler
/// list; lives for the whole process.
pub(crate) struct EntryPoint {
    pub key: EntryPointKey,
    pub src_path: String,
    pub runtime: RuntimeKind,
    /// Prebuilt request handed to the toolchain on every rebuild.
    pub request: BuildRequest,
    /// `tsconfig.json` next to the source path, when present (node only).
    pub tsconfig: Option<PathBuf>,

    /// Last build outcome was a failure.
    pub has_error: bool,
    /// Start time of the in-flight build, if one is running.
    pub build_started: Option<SystemTime>,
    /// Descriptor of the last successful build output.
    pub artifact: Option<BuiltArtifact>,
    /// Source files the last successful build read.
    pub input_files: FxHashSet<PathBuf>,

    pub priority: RebuildPriority,
    /// Monotonic stamp taken when the entry became dirty; go builds of
    /// equal priority dispatch in stamp order.
    pub dirty_seq: u64,
    /// FIFO of waiters for the next successful build.
    pub waiters: VecDeque<Waiter>,
}

impl EntryPoint {
    pub fn new(config: &AppConfig, handler: &HandlerConfig) -> Self {
        let key = EntryPointKey::new(&handler.src_path, &handler.handler);
        let runtime = handler.runtime();
        let src_dir = config.src_dir(&handler.src_path);

        let tsconfig = match runtime {
            RuntimeKind::Node => {
                let candidate = src_dir.join("tsconfig.json");
                candidate.is_file().then_some(candidate)
            }
            _ => None,
        };

        let request = BuildRequest {
            key: key.as_str().to_string(),
            runtime,
            src_dir,
            handler: handler.handler.clone(),
            bundle: handler.bundle,
            out_dir: config
                .out_dir()
                .join("handlers")
                .join(fingerprint(key.as_str())),
            app_path: config.app_path.clone(),
        };

        Self {
            key,
            src_path: handler.src_path.clone(),
            runtime,
            request,
            tsconfig,
            has_error: false,
            build_started: None,
            artifact: None,
            input_files: FxHashSet::default(),
            priority: RebuildPriority::Off,
            dirty_seq: 0,
            waiters: VecDeque::new(),
        }
    }

    pub fn building(&self) -> bool {
        self.build_started.is_some()
    }

    /// Clean: no build in flight and no rebuild wanted.
    pub fn is_clean(&self) -> bool {
        !self.building() && !self.priority.is_dirty()
    }

    /// Raise the rebuild priority. Never lowers an existing priority;
    /// the dirty stamp is taken only on the off→dirty transition.
    pub fn mark_dirty(&mut self, priority: RebuildPriority, seq: u64) {
        if !self.priority.is_dirty() {
            self.dirty_seq = seq;
        }
        self.priority = self.priority.max(priority);
    }

    /// Current artifact paired with the runtime, for request replies.
    pub fn built_handler(&self) -> Option<BuiltHandler> {
        self.artifact.as_ref().map(|artifact| BuiltHandler {
            runtime: self.runtime,
            artifact: artifact.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        let key = EntryPointKey::new("services", "src/api.handler");
        assert_eq!(key.as_str(), "services|src/api.handler");
    }

    #[test]
    fn test_mark_dirty_is_monotone() {
        let config = AppConfig::default();
        let handler = HandlerConfig {
            src_path: "services".into(),
            handler: "src/api.handler".into(),
            runtime: Some(RuntimeKind::Node),
            bundle: true,
        };
        let mut ep = EntryPoint::new(&config, &handler);

        ep.mark_dirty(RebuildPriority::High, 1);
        ep.mark_dirty(RebuildPriority::Low, 2);
        assert_eq!(ep.priority, RebuildPriority::High);
        // Stamp taken on the off→dirty transition only.
        assert_eq!(ep.dirty_seq, 1);
    }

    #[test]
    fn test_clean_transitions() {
        let config = AppConfig::default();
        let handler = HandlerConfig {
            src_path: "services".into(),
            handler: "src/api.handler".into(),
            runtime: Some(RuntimeKind::Node),
            bundle: true,
        };
        let mut ep = EntryPoint::new(&config, &handler);
        assert!(ep.is_clean());

        ep.mark_dirty(RebuildPriority::Low, 1);
        assert!(!ep.is_clean());

        ep.priority = RebuildPriority::Off;
        ep.build_started = Some(SystemTime::now());
        assert!(!ep.is_clean());
    }
}
