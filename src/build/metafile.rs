//! Bundler metafile parsing.
//!
//! The node bundler emits a JSON metafile enumerating the input paths it
//! read. Paths are relative to the bundler's working directory; we resolve
//! them to absolute paths and return the set as the entry point's
//! `input_files`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rustc_hash::FxHashSet;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Metafile {
    #[serde(default)]
    inputs: std::collections::BTreeMap<String, serde_json::Value>,
}

/// Parse metafile JSON and resolve input paths against `base_dir`.
pub fn parse_input_files(json: &str, base_dir: &Path) -> Result<FxHashSet<PathBuf>> {
    let metafile: Metafile = serde_json::from_str(json).context("invalid metafile JSON")?;

    let files = metafile
        .inputs
        .into_keys()
        // Namespaced pseudo-inputs ("ns:...", "(disabled):...") are not files.
        .filter(|key| !key.starts_with('(') && !key.contains("://"))
        .map(|key| {
            let path = Path::new(&key);
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                base_dir.join(path)
            }
        })
        .collect();

    Ok(files)
}

/// Read a metafile from disk. A read or parse failure is logged and
/// yields an empty set: the entry point stays valid but loses file-change
/// tracking until the next successful build.
pub fn read_input_files(path: &Path, base_dir: &Path) -> FxHashSet<PathBuf> {
    let result = std::fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|json| parse_input_files(&json, base_dir));

    match result {
        Ok(files) => files,
        Err(e) => {
            crate::log!("build"; "failed to read metafile {}: {}", path.display(), e);
            FxHashSet::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_relative_and_absolute() {
        let json = r#"{
            "inputs": {
                "src/api.ts": { "bytes": 120 },
                "/abs/shared/util.ts": { "bytes": 80 }
            }
        }"#;
        let files = parse_input_files(json, Path::new("/app/services")).unwrap();
        assert!(files.contains(Path::new("/app/services/src/api.ts")));
        assert!(files.contains(Path::new("/abs/shared/util.ts")));
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_parse_skips_pseudo_inputs() {
        let json = r#"{
            "inputs": {
                "(disabled):fs": {},
                "https://cdn.example/mod.js": {},
                "src/api.ts": {}
            }
        }"#;
        let files = parse_input_files(json, Path::new("/app")).unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(parse_input_files("not json", Path::new("/app")).is_err());
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let files = read_input_files(Path::new("/nonexistent/meta.json"), Path::new("/app"));
        assert!(files.is_empty());
    }
}
