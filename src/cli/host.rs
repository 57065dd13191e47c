//! Command-backed infra host.
//!
//! Implements the synth/deploy callbacks by running the commands from
//! `[infra]`. Checksums come from hashing the synthesized stack template
//! files, so unchanged stacks drop out of the deploy plan.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use anyhow::{Result, bail};

use crate::config::AppConfig;
use crate::utils::hash::hex_digest_reader;
use crate::watcher::infra::{ChecksumMap, InfraHost, SynthError, SynthOutput};

const TEMPLATE_SUFFIX: &str = ".template.json";

pub struct CommandInfraHost {
    config: Arc<AppConfig>,
}

impl CommandInfraHost {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self { config }
    }
}

impl InfraHost for CommandInfraHost {
    fn synth(&self) -> Result<SynthOutput, SynthError> {
        let Some((program, args)) = self.config.infra.synth_command.split_first() else {
            return Err(SynthError::Failed("no synth command configured".into()));
        };

        let status = Command::new(program)
            .args(args)
            .current_dir(&self.config.app_path)
            .status()
            .map_err(|e| SynthError::Failed(format!("failed to run `{program}`: {e}")))?;

        if !status.success() {
            return Err(SynthError::Failed(format!("synth exited with {status}")));
        }

        let assembly_dir = self.config.app_path.join("cdk.out");
        let checksums = stack_checksums(&assembly_dir)
            .map_err(|e| SynthError::Failed(format!("failed to checksum assembly: {e}")))?;

        Ok(SynthOutput {
            assembly_dir: Some(assembly_dir),
            checksums,
        })
    }

    fn deploy(&self, changed: &ChecksumMap) -> Result<()> {
        let Some((program, args)) = self.config.infra.deploy_command.split_first() else {
            bail!("no deploy command configured");
        };

        let mut stacks: Vec<&str> = changed.keys().map(String::as_str).collect();
        stacks.sort_unstable();

        let status = Command::new(program)
            .args(args)
            .args(&stacks)
            .current_dir(&self.config.app_path)
            .status()?;

        if !status.success() {
            bail!("deploy exited with {status}");
        }
        Ok(())
    }
}

/// Hash every `*.template.json` in the assembly directory; the stack name
/// is the file name minus the suffix.
fn stack_checksums(assembly_dir: &Path) -> Result<ChecksumMap> {
    let mut checksums = ChecksumMap::default();

    let entries = match std::fs::read_dir(assembly_dir) {
        Ok(entries) => entries,
        // No assembly yet: nothing deployed, nothing to narrow.
        Err(_) => return Ok(checksums),
    };

    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(stack) = name.to_str().and_then(|n| n.strip_suffix(TEMPLATE_SUFFIX)) else {
            continue;
        };

        let file = std::fs::File::open(entry.path())?;
        checksums.insert(stack.to_string(), hex_digest_reader(file)?);
    }

    Ok(checksums)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_stack_checksums() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("Api.template.json"), "{\"a\":1}").unwrap();
        std::fs::write(temp.path().join("Db.template.json"), "{\"b\":2}").unwrap();
        std::fs::write(temp.path().join("manifest.json"), "{}").unwrap();

        let checksums = stack_checksums(temp.path()).unwrap();
        assert_eq!(checksums.len(), 2);
        assert!(checksums.contains_key("Api"));
        assert!(checksums.contains_key("Db"));
    }

    #[test]
    fn test_stack_checksums_change_with_content() {
        let temp = TempDir::new().unwrap();
        let template = temp.path().join("Api.template.json");

        std::fs::write(&template, "v1").unwrap();
        let first = stack_checksums(temp.path()).unwrap();

        std::fs::write(&template, "v2").unwrap();
        let second = stack_checksums(temp.path()).unwrap();

        assert_ne!(first["Api"], second["Api"]);
    }

    #[test]
    fn test_missing_assembly_dir_is_empty() {
        let checksums = stack_checksums(Path::new("/nonexistent/cdk.out")).unwrap();
        assert!(checksums.is_empty());
    }
}
