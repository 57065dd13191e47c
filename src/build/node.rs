//! Node-like handler builds via the esbuild CLI.
//!
//! Each build bundles the entry file into the artifact directory and
//! writes a metafile we mine for the input-file set.

use std::path::{Path, PathBuf};
use std::process::Command;

use super::metafile;
use super::{BuildError, BuildOutput, BuildRequest, BuiltArtifact, is_debug_env};

/// Extensions tried when resolving the handler file part to a source file.
const ENTRY_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "js", "mjs", "cjs"];

/// Build one node-like entry point.
pub(super) fn build(req: &BuildRequest) -> Result<BuildOutput, BuildError> {
    let (file_part, symbol) = req.split_handler();
    let entry = resolve_entry(&req.src_dir, file_part)
        .ok_or_else(|| BuildError(format!("handler entry not found: {}", req.handler)))?;

    let meta_path = req.out_dir.join("meta.json");
    run_bundler(&entry, &req.out_dir, &meta_path, req.bundle, &req.src_dir)?;

    let stem = entry
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".into());

    Ok(BuildOutput {
        artifact: BuiltArtifact {
            entry_file: req.out_dir.join(format!("{stem}.js")),
            handler_symbol: symbol.to_string(),
            out_dir: req.out_dir.clone(),
            source_path: req.handler.clone(),
        },
        input_files: metafile::read_input_files(&meta_path, &req.src_dir),
    })
}

/// Rebuild the infrastructure entry. Bundling is disabled: we only need
/// transpilation plus the metafile's view of the import graph.
pub(super) fn build_infra(app_path: &Path, entry: &Path) -> Result<BuildOutput, BuildError> {
    let entry_abs = app_path.join(entry);
    if !entry_abs.exists() {
        return Err(BuildError(format!(
            "infra entry not found: {}",
            entry.display()
        )));
    }

    let out_dir = app_path.join(".strato").join("infra");
    let meta_path = out_dir.join("meta.json");
    run_bundler(&entry_abs, &out_dir, &meta_path, true, app_path)?;

    let input_files = metafile::read_input_files(&meta_path, app_path);
    let stem = entry_abs
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "app".into());

    Ok(BuildOutput {
        artifact: BuiltArtifact {
            entry_file: out_dir.join(format!("{stem}.js")),
            handler_symbol: String::new(),
            out_dir,
            source_path: entry.to_string_lossy().into_owned(),
        },
        input_files,
    })
}

/// Resolve `dir/file` to an existing source file by extension probing.
fn resolve_entry(src_dir: &Path, file_part: &str) -> Option<PathBuf> {
    for ext in ENTRY_EXTENSIONS {
        let candidate = src_dir.join(format!("{file_part}.{ext}"));
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

fn run_bundler(
    entry: &Path,
    out_dir: &Path,
    meta_path: &Path,
    bundle: bool,
    cwd: &Path,
) -> Result<(), BuildError> {
    std::fs::create_dir_all(out_dir)
        .map_err(|e| BuildError(format!("failed to create {}: {}", out_dir.display(), e)))?;

    let log_level = if is_debug_env() { "warning" } else { "error" };

    let mut cmd = Command::new("esbuild");
    cmd.arg(entry)
        .arg("--platform=node")
        .arg("--format=cjs")
        .arg(format!("--outdir={}", out_dir.display()))
        .arg(format!("--metafile={}", meta_path.display()))
        .arg(format!("--log-level={log_level}"))
        .current_dir(cwd);
    if bundle {
        cmd.arg("--bundle").arg("--external:aws-sdk");
    }

    let output = cmd
        .output()
        .map_err(|e| BuildError(format!("failed to run bundler: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BuildError(format!(
            "bundler exited with {}\n{}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_entry_prefers_typescript() {
        let temp = TempDir::new().unwrap();
        let src = temp.path();
        std::fs::create_dir_all(src.join("src")).unwrap();
        std::fs::write(src.join("src/api.ts"), "export const handler = 1;").unwrap();
        std::fs::write(src.join("src/api.js"), "exports.handler = 1;").unwrap();

        let entry = resolve_entry(src, "src/api").unwrap();
        assert_eq!(entry, src.join("src/api.ts"));
    }

    #[test]
    fn test_resolve_entry_missing() {
        let temp = TempDir::new().unwrap();
        assert!(resolve_entry(temp.path(), "src/api").is_none());
    }
}
