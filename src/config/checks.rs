//! `[checks]` section configuration.
//!
//! Lint and type-check both run as child processes over a source path's
//! input files once every entry point in it is build-clean. Exit codes
//! are not interpreted; the child's own output is the report.
//!
//! ```toml
//! [checks]
//! lint = true
//! typecheck = true
//! lint_command = ["npx", "eslint"]
//! typecheck_command = ["npx", "tsc"]
//! ```

use serde::Deserialize;

/// Lint / type-check settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChecksConfig {
    /// Run the linter over changed source paths.
    pub lint: bool,

    /// Run the type checker over source paths with a tsconfig.
    pub typecheck: bool,

    /// Linter argv; file list is appended.
    pub lint_command: Vec<String>,

    /// Type checker argv; `--noEmit --pretty <bool>` is appended.
    pub typecheck_command: Vec<String>,
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            lint: true,
            typecheck: true,
            lint_command: vec!["npx".into(), "eslint".into()],
            typecheck_command: vec!["npx".into(), "tsc".into()],
        }
    }
}
