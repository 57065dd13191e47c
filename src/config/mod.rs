//! Application configuration management for `strato.toml`.
//!
//! # Sections
//!
//! | Section        | Purpose                                            |
//! |----------------|----------------------------------------------------|
//! | `[[handlers]]` | Deployable function units (src_path, handler, ...) |
//! | `[infra]`      | Infrastructure entry, synth/deploy commands        |
//! | `[checks]`     | Lint and type-check toggles and commands           |

mod checks;
mod handler;
mod infra;

pub use checks::ChecksConfig;
pub use handler::HandlerConfig;
pub use infra::InfraConfig;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::utils::normalize_path;

// ============================================================================
// Root configuration
// ============================================================================

/// Root configuration structure representing `strato.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Application root directory - parent of the config file (internal)
    #[serde(skip)]
    pub app_path: PathBuf,

    /// Absolute path to the config file (internal)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Handler entry points, one `[[handlers]]` table each
    pub handlers: Vec<HandlerConfig>,

    /// Infrastructure subsystem settings
    pub infra: InfraConfig,

    /// Lint / type-check settings
    pub checks: ChecksConfig,

    /// Override for the go build concurrency cap.
    /// Defaults to the number of hardware threads.
    pub builder_concurrency: Option<usize>,
}

impl AppConfig {
    /// Load configuration from a `strato.toml` file.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_path = normalize_path(config_path);
        let raw = fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;

        let mut config: Self = toml::from_str(&raw)
            .with_context(|| format!("failed to parse {}", config_path.display()))?;

        let Some(app_path) = config_path.parent() else {
            bail!("config file has no parent directory");
        };
        config.app_path = app_path.to_path_buf();
        config.config_path = config_path.clone();

        for handler in &mut config.handlers {
            handler.normalize();
        }

        Ok(config)
    }

    /// Absolute directory of a handler source path.
    pub fn src_dir(&self, src_path: &str) -> PathBuf {
        self.app_path.join(src_path)
    }

    /// Absolute build-artifact directory for the whole app.
    pub fn out_dir(&self) -> PathBuf {
        self.app_path.join(".strato")
    }

    /// Concurrency cap for go builds.
    pub fn builder_concurrency(&self) -> usize {
        self.builder_concurrency.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }

    /// Initial infrastructure input files, absolute.
    pub fn infra_input_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self
            .infra
            .input_files
            .iter()
            .map(|p| self.app_path.join(p))
            .collect();
        if let Some(entry) = &self.infra.entry {
            files.push(self.app_path.join(entry));
        }
        files
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RuntimeKind;

    fn parse(toml_str: &str) -> AppConfig {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn test_parse_minimal() {
        let config = parse(
            r#"
            [[handlers]]
            src_path = "services"
            handler = "src/api.handler"
            "#,
        );
        assert_eq!(config.handlers.len(), 1);
        assert_eq!(config.handlers[0].src_path, "services");
        assert!(config.checks.lint);
        assert!(config.checks.typecheck);
        assert!(config.infra.entry.is_none());
    }

    #[test]
    fn test_runtime_detection_on_normalize() {
        let mut config = parse(
            r#"
            [[handlers]]
            src_path = "services"
            handler = "handlers/get.go"

            [[handlers]]
            src_path = "services"
            handler = "src/api.handler"

            [[handlers]]
            src_path = "etl"
            handler = "jobs/ingest.main"
            runtime = "python"
            "#,
        );
        for handler in &mut config.handlers {
            handler.normalize();
        }
        assert_eq!(config.handlers[0].runtime(), RuntimeKind::Go);
        assert_eq!(config.handlers[1].runtime(), RuntimeKind::Node);
        assert_eq!(config.handlers[2].runtime(), RuntimeKind::Python);
    }

    #[test]
    fn test_infra_section() {
        let config = parse(
            r#"
            handlers = []

            [infra]
            entry = "infra/app.ts"
            input_files = ["infra/stacks.ts"]
            synth_command = ["npx", "cdk", "synth"]
            deploy_command = ["npx", "cdk", "deploy", "--all"]
            require_approval = false
            "#,
        );
        assert_eq!(config.infra.entry.as_deref(), Some(Path::new("infra/app.ts")));
        assert!(!config.infra.require_approval);
        assert_eq!(config.infra.synth_command[1], "cdk");
    }

    #[test]
    fn test_builder_concurrency_default() {
        let config = parse("handlers = []");
        assert!(config.builder_concurrency() >= 1);

        let config = parse("handlers = []\nbuilder_concurrency = 2");
        assert_eq!(config.builder_concurrency(), 2);
    }
}
