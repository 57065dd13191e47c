//! `[infra]` section configuration.
//!
//! Describes the infrastructure subsystem: the app entry file that gets
//! rebuilt on edits, the commands used to synthesize and deploy, and the
//! approval gate.
//!
//! ```toml
//! [infra]
//! entry = "infra/app.ts"
//! input_files = ["infra/stacks.ts"]
//! synth_command = ["npx", "cdk", "synth", "--quiet"]
//! deploy_command = ["npx", "cdk", "deploy", "--require-approval", "never"]
//! require_approval = true
//! ```

use std::path::PathBuf;

use serde::Deserialize;

/// Infrastructure subsystem settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InfraConfig {
    /// Infrastructure app entry file, relative to the app root.
    /// When absent the infra state machine is disabled.
    pub entry: Option<PathBuf>,

    /// Additional infra input files watched before the first rebuild
    /// discovers the real set.
    pub input_files: Vec<PathBuf>,

    /// Command that synthesizes the infrastructure model.
    pub synth_command: Vec<String>,

    /// Command that deploys changed stacks.
    pub deploy_command: Vec<String>,

    /// Wait for the user to approve before deploying.
    pub require_approval: bool,
}

impl Default for InfraConfig {
    fn default() -> Self {
        Self {
            entry: None,
            input_files: Vec::new(),
            synth_command: Vec::new(),
            deploy_command: Vec::new(),
            require_approval: true,
        }
    }
}
