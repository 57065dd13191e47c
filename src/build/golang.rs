//! Go-like handler builds via `go build`.
//!
//! One compiler invocation per entry point, producing a stripped binary
//! in the artifact directory. Input files are not tracked: go entry
//! points are rebuilt by the coarse `.go` fan-out rule.

use std::process::Command;

use rustc_hash::FxHashSet;

use super::{BuildError, BuildOutput, BuildRequest, BuiltArtifact};

/// Build one go-like entry point.
pub(super) fn build(req: &BuildRequest) -> Result<BuildOutput, BuildError> {
    let bin_rel = bin_rel_path(req);
    let bin_abs = req.app_path.join(&bin_rel);
    let handler_abs = req.src_dir.join(&req.handler);

    if let Some(parent) = bin_abs.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| BuildError(format!("failed to create {}: {}", parent.display(), e)))?;
    }

    let output = Command::new("go")
        .arg("build")
        .arg("-ldflags")
        .arg("-s -w")
        .arg("-o")
        .arg(&bin_rel)
        .arg(&handler_abs)
        .current_dir(&req.app_path)
        .output()
        .map_err(|e| BuildError(format!("failed to run go build: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BuildError(format!(
            "go build exited with {}\n{}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(BuildOutput {
        artifact: BuiltArtifact {
            entry_file: bin_abs,
            handler_symbol: String::new(),
            out_dir: req.out_dir.clone(),
            source_path: req.handler.clone(),
        },
        input_files: FxHashSet::default(),
    })
}

/// Output binary path relative to the app root (`go build -o` argument).
/// The suffix is `.exe` on a Windows host, none otherwise.
fn bin_rel_path(req: &BuildRequest) -> String {
    let stem = req
        .handler
        .rsplit('/')
        .next()
        .unwrap_or(&req.handler)
        .trim_end_matches(".go");

    let out_rel = req
        .out_dir
        .strip_prefix(&req.app_path)
        .unwrap_or(&req.out_dir);

    format!(
        "{}/{}{}",
        out_rel.display(),
        stem,
        std::env::consts::EXE_SUFFIX
    )
}
