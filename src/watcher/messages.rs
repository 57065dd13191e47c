//! Event definitions for the orchestrator control loop.
//!
//! Every external stimulus is marshalled into one `WatchEvent` and
//! processed in arrival order by the single control task:
//!
//! ```text
//! FsActor ──PathsChanged──┐
//! build tasks ─Finished──►│ Orchestrator ──spawns──► builds/checkers/synth
//! host/API ───Request────►│   (owns all state)
//! checker tasks ─Exited──►│
//! ```

use std::path::PathBuf;
use std::time::SystemTime;

use serde::Serialize;
use tokio::sync::oneshot;

use crate::build::{BuildError, BuildOutput, BuiltArtifact};
use crate::core::RuntimeKind;

use super::infra::{SynthError, SynthOutput};
use super::registry::EntryPointKey;

// =============================================================================
// Events
// =============================================================================

/// Messages consumed by the orchestrator loop.
pub(crate) enum WatchEvent {
    /// Debounced file-change batch from the fs actor (or a test driver).
    PathsChanged(Vec<PathBuf>),
    /// A handler build finished.
    BuildFinished {
        key: EntryPointKey,
        /// Wall-clock start of the build, for the added-file mtime race.
        started: SystemTime,
        result: Result<BuildOutput, BuildError>,
    },
    /// The infrastructure rebuild finished.
    InfraBuildFinished {
        result: Result<BuildOutput, BuildError>,
    },
    /// The host synth callback finished.
    SynthFinished(Result<SynthOutput, SynthError>),
    /// The host deploy callback finished.
    DeployFinished { ok: bool },
    /// On-demand request for a built handler.
    Request {
        src_path: String,
        handler: String,
        reply: oneshot::Sender<Result<BuiltHandler, RequestError>>,
    },
    /// A lint or type-check child reported exit.
    CheckerExited {
        scope: CheckScope,
        kind: CheckerKind,
        id: u64,
    },
    /// User pressed the input key (deploy approval).
    Input,
    /// State snapshot request.
    GetState(oneshot::Sender<StateSnapshot>),
    /// Stop the loop.
    Shutdown,
}

/// Which subsystem a checker process belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CheckScope {
    Source(String),
    Infra,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CheckerKind {
    Lint,
    TypeCheck,
}

impl CheckerKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Lint => "lint",
            Self::TypeCheck => "typecheck",
        }
    }
}

// =============================================================================
// Request reply types
// =============================================================================

/// A fresh, built handler: what `get_built_handler` resolves with.
#[derive(Debug, Clone, Serialize)]
pub struct BuiltHandler {
    pub runtime: RuntimeKind,
    pub artifact: BuiltArtifact,
}

/// Why an on-demand request was rejected.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RequestError {
    #[error("unknown handler `{0}`")]
    UnknownHandler(String),
    #[error("building `{key}` failed: {message}")]
    BuildFailed { key: String, message: String },
    #[error("watcher stopped")]
    Stopped,
}

// =============================================================================
// State snapshot
// =============================================================================

/// Introspection summary returned by `get_state`.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub entry_points: Vec<EntryPointState>,
    pub source_paths: Vec<SourcePathState>,
    /// Infra state machine state name.
    pub infra_state: &'static str,
    /// Any entry point building/dirty, or any source path checking.
    pub handlers_busy: bool,
    /// Infra machine not in its idle state.
    pub infra_busy: bool,
    /// The single "is the system quiescent?" bit.
    pub is_busy: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryPointState {
    pub key: String,
    pub runtime: &'static str,
    pub has_error: bool,
    pub building: bool,
    pub priority: &'static str,
    pub pending_requests: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourcePathState {
    pub src_path: String,
    pub needs_recheck: bool,
    pub lint_running: bool,
    pub typecheck_running: bool,
}
