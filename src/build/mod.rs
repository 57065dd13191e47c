//! Handler build backends.
//!
//! The scheduler talks to builders through the [`Toolchain`] trait; each
//! build is a black box returning success/failure plus the set of input
//! files it consumed. The process-backed implementation shells out:
//!
//! - node-like: bundler CLI with a JSON metafile for input tracking
//! - go-like: `go build` per entry point
//! - python-like: no build step, synchronous success
//!
//! Builds run on blocking worker threads; completions are marshalled back
//! to the orchestrator as events.

pub mod metafile;

mod golang;
mod node;
mod python;

use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;

use crate::core::RuntimeKind;

// ============================================================================
// Data types
// ============================================================================

/// Everything a builder needs to rebuild one entry point.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Entry-point key, used to name the artifact directory.
    pub key: String,
    pub runtime: RuntimeKind,
    /// Absolute source directory (`app_path/src_path`).
    pub src_dir: PathBuf,
    /// Handler path as configured (`dir/file.symbol`, `dir/file.go`, dir).
    pub handler: String,
    /// Bundle dependencies (node only).
    pub bundle: bool,
    /// Absolute artifact directory for this entry point.
    pub out_dir: PathBuf,
    /// Application root (go builds run relative to it).
    pub app_path: PathBuf,
}

impl BuildRequest {
    /// Split `dir/file.symbol` into the file part and the symbol.
    ///
    /// Go handlers have no symbol; the whole string is the file part.
    pub fn split_handler(&self) -> (&str, &str) {
        if self.runtime == RuntimeKind::Go {
            return (self.handler.as_str(), "");
        }
        match self.handler.rsplit_once('.') {
            Some((file, symbol)) => (file, symbol),
            None => (self.handler.as_str(), ""),
        }
    }
}

/// Descriptor of the last successful build output.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BuiltArtifact {
    /// Entry file of the artifact (bundled js, compiled binary, source file).
    pub entry_file: PathBuf,
    /// Exported handler symbol, empty for go binaries.
    pub handler_symbol: String,
    /// Directory holding the artifact.
    pub out_dir: PathBuf,
    /// Original handler path as configured (posix form).
    pub source_path: String,
}

/// Successful build: artifact plus the input files the build consumed.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub artifact: BuiltArtifact,
    pub input_files: FxHashSet<PathBuf>,
}

/// A failed build. The message is the builder's own diagnostics; the
/// orchestrator records it and rejects waiters, nothing more.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct BuildError(pub String);

// ============================================================================
// Toolchain trait
// ============================================================================

/// Build backend seam between the scheduler and the external builders.
///
/// Implementations may keep per-entry incremental state internally, keyed
/// by `BuildRequest::key`; the registry stays plain data.
pub trait Toolchain: Send + Sync + 'static {
    /// Build one handler entry point. Blocking; called on a worker thread.
    fn build(&self, req: &BuildRequest) -> Result<BuildOutput, BuildError>;

    /// Rebuild the infrastructure entry and report its input files.
    fn build_infra(&self, app_path: &Path, entry: &Path) -> Result<BuildOutput, BuildError>;
}

// ============================================================================
// Process-backed toolchain
// ============================================================================

/// Toolchain that shells out to the real builders.
#[derive(Debug, Default)]
pub struct ProcessToolchain;

impl Toolchain for ProcessToolchain {
    fn build(&self, req: &BuildRequest) -> Result<BuildOutput, BuildError> {
        match req.runtime {
            RuntimeKind::Node => node::build(req),
            RuntimeKind::Go => golang::build(req),
            RuntimeKind::Python => Ok(python::build(req)),
        }
    }

    fn build_infra(&self, app_path: &Path, entry: &Path) -> Result<BuildOutput, BuildError> {
        node::build_infra(app_path, entry)
    }
}

/// `DEBUG` environment flag (any truthy value raises bundler verbosity).
pub(crate) fn is_debug_env() -> bool {
    std::env::var("DEBUG")
        .map(|v| !v.is_empty() && v != "0" && v.to_ascii_lowercase() != "false")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(runtime: RuntimeKind, handler: &str) -> BuildRequest {
        BuildRequest {
            key: "services|x".into(),
            runtime,
            src_dir: PathBuf::from("/app/services"),
            handler: handler.into(),
            bundle: true,
            out_dir: PathBuf::from("/app/.strato/handlers/x"),
            app_path: PathBuf::from("/app"),
        }
    }

    #[test]
    fn test_split_handler_node() {
        let req = request(RuntimeKind::Node, "src/api.handler");
        assert_eq!(req.split_handler(), ("src/api", "handler"));
    }

    #[test]
    fn test_split_handler_go_keeps_extension() {
        let req = request(RuntimeKind::Go, "handlers/get.go");
        assert_eq!(req.split_handler(), ("handlers/get.go", ""));
    }

    #[test]
    fn test_split_handler_go_directory() {
        let req = request(RuntimeKind::Go, "cmd/server");
        assert_eq!(req.split_handler(), ("cmd/server", ""));
    }
}
