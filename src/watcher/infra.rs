//! Infrastructure state machine.
//!
//! Orders rebuild → synth → (approval) → deploy for the infrastructure
//! code. The machine is pure: every input returns the follow-up action
//! for the orchestrator to execute, and in-flight phases coalesce any
//! number of incoming edits into a single dirty latch.
//!
//! ```text
//! Idle ──edit──► BuildPending ──► Building ──ok──► SynthPending ──► Synthesizing
//!                     ▲              │fail             ▲                │
//!                     │         BuildFailed            │      ok / cancelled / fail
//!                     │                                │                ▼
//!                     └──edit/latch── Deploying ◄──input── AwaitingApproval
//! ```

use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::watcher::checks::CheckerHandle;

// =============================================================================
// Host interface
// =============================================================================

/// Per-stack content checksums produced by the synth step.
pub type ChecksumMap = FxHashMap<String, String>;

/// Result of a successful synth.
#[derive(Debug, Clone, Default)]
pub struct SynthOutput {
    /// Directory holding the synthesized assembly, when the host has one.
    pub assembly_dir: Option<PathBuf>,
    /// Per-stack content checksums.
    pub checksums: ChecksumMap,
}

/// Synth failure modes. Cancellation is not an error: the machine
/// restarts from the build phase without telling the user anything.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SynthError {
    #[error("synth cancelled")]
    Cancelled,
    #[error("synth failed: {0}")]
    Failed(String),
}

/// Host callbacks for the infra subsystem. Both run on blocking worker
/// threads; completions come back to the orchestrator as events.
pub trait InfraHost: Send + Sync + 'static {
    /// Re-synthesize the infrastructure model.
    fn synth(&self) -> Result<SynthOutput, SynthError>;

    /// Deploy the given changed stacks.
    fn deploy(&self, changed: &ChecksumMap) -> anyhow::Result<()>;
}

// =============================================================================
// States
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdkState {
    Idle,
    BuildPending,
    Building,
    BuildFailed,
    SynthPending,
    Synthesizing,
    SynthFailed,
    AwaitingApproval,
    Deploying,
}

impl CdkState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::BuildPending => "build-pending",
            Self::Building => "building",
            Self::BuildFailed => "build-failed",
            Self::SynthPending => "synth-pending",
            Self::Synthesizing => "synthesizing",
            Self::SynthFailed => "synth-failed",
            Self::AwaitingApproval => "awaiting-approval",
            Self::Deploying => "deploying",
        }
    }

    /// Work is in flight (drives the infra busy-edge messages).
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::BuildPending
                | Self::Building
                | Self::SynthPending
                | Self::Synthesizing
                | Self::Deploying
        )
    }
}

/// Follow-up work the orchestrator must start after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum InfraAction {
    StartBuild,
    StartSynth,
    StartDeploy(ChecksumMap),
}

// =============================================================================
// Machine
// =============================================================================

pub(crate) struct InfraMachine {
    enabled: bool,
    state: CdkState,
    /// Coalescing latch: edits that arrived while a phase was in flight.
    dirty: bool,
    require_approval: bool,
    input_files: FxHashSet<PathBuf>,
    /// Checksums of the last successful deploy.
    deployed: ChecksumMap,
    /// Output of the synth awaiting approval or deploy completion.
    pending: Option<SynthOutput>,
    /// Live checker processes over the infra input set.
    pub lint: Option<CheckerHandle>,
    pub typecheck: Option<CheckerHandle>,
}

impl InfraMachine {
    pub fn new(
        enabled: bool,
        require_approval: bool,
        initial_inputs: Vec<PathBuf>,
        deployed: ChecksumMap,
    ) -> Self {
        Self {
            enabled,
            state: CdkState::Idle,
            dirty: false,
            require_approval,
            input_files: initial_inputs.into_iter().collect(),
            deployed,
            pending: None,
            lint: None,
            typecheck: None,
        }
    }

    pub fn state(&self) -> CdkState {
        self.state
    }

    pub fn is_input(&self, path: &Path) -> bool {
        self.enabled && self.input_files.contains(path)
    }

    pub fn input_files(&self) -> &FxHashSet<PathBuf> {
        &self.input_files
    }

    /// Replace the input set after a successful rebuild; returns the
    /// (added, removed) difference for the watch-set manager.
    pub fn set_input_files(&mut self, files: FxHashSet<PathBuf>) -> (Vec<PathBuf>, Vec<PathBuf>) {
        let added = files.difference(&self.input_files).cloned().collect();
        let removed = self.input_files.difference(&files).cloned().collect();
        self.input_files = files;
        (added, removed)
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    /// An infra input file changed.
    pub fn on_edit(&mut self) -> Option<InfraAction> {
        if !self.enabled {
            return None;
        }
        match self.state {
            CdkState::Idle | CdkState::BuildFailed | CdkState::SynthFailed => {
                self.state = CdkState::BuildPending;
                self.pump()
            }
            CdkState::AwaitingApproval => {
                // The pending approval is discarded along with its synth.
                self.pending = None;
                self.state = CdkState::BuildPending;
                self.pump()
            }
            CdkState::Building | CdkState::Synthesizing | CdkState::Deploying => {
                self.dirty = true;
                None
            }
            CdkState::BuildPending | CdkState::SynthPending => None,
        }
    }

    pub fn on_build_ok(&mut self) -> Option<InfraAction> {
        self.state = if self.take_dirty() {
            CdkState::BuildPending
        } else {
            CdkState::SynthPending
        };
        self.pump()
    }

    pub fn on_build_err(&mut self) -> Option<InfraAction> {
        if self.take_dirty() {
            self.state = CdkState::BuildPending;
            return self.pump();
        }
        self.state = CdkState::BuildFailed;
        None
    }

    pub fn on_synth_done(
        &mut self,
        result: Result<SynthOutput, SynthError>,
    ) -> Option<InfraAction> {
        // Terminal transition: a set latch always restarts from the build.
        if self.take_dirty() {
            self.state = CdkState::BuildPending;
            return self.pump();
        }

        match result {
            Ok(output) => {
                self.pending = Some(output);
                if self.require_approval {
                    self.state = CdkState::AwaitingApproval;
                    None
                } else {
                    self.begin_deploy()
                }
            }
            Err(SynthError::Cancelled) => {
                self.state = CdkState::BuildPending;
                self.pump()
            }
            Err(SynthError::Failed(_)) => {
                self.state = CdkState::SynthFailed;
                None
            }
        }
    }

    /// User pressed the input key. Ignored outside the approval gate.
    pub fn on_input(&mut self) -> Option<InfraAction> {
        if self.state != CdkState::AwaitingApproval {
            return None;
        }
        self.begin_deploy()
    }

    pub fn on_deploy_done(&mut self, ok: bool) -> Option<InfraAction> {
        if ok && let Some(pending) = self.pending.take() {
            self.deployed = pending.checksums;
        }
        self.pending = None;

        self.state = if self.take_dirty() {
            CdkState::BuildPending
        } else {
            CdkState::Idle
        };
        self.pump()
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn begin_deploy(&mut self) -> Option<InfraAction> {
        let pending = self.pending.as_ref()?;
        let changed = changed_stacks(&self.deployed, &pending.checksums);
        self.state = CdkState::Deploying;
        Some(InfraAction::StartDeploy(changed))
    }

    /// Advance a pending state into its in-flight phase.
    fn pump(&mut self) -> Option<InfraAction> {
        match self.state {
            CdkState::BuildPending => {
                self.state = CdkState::Building;
                Some(InfraAction::StartBuild)
            }
            CdkState::SynthPending => {
                self.state = CdkState::Synthesizing;
                Some(InfraAction::StartSynth)
            }
            _ => None,
        }
    }

    fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}

/// Stacks whose checksum differs from the last deployed map (or are new).
/// Unchanged stacks are excluded from the deploy plan.
pub(crate) fn changed_stacks(deployed: &ChecksumMap, next: &ChecksumMap) -> ChecksumMap {
    next.iter()
        .filter(|(stack, checksum)| deployed.get(*stack) != Some(checksum))
        .map(|(stack, checksum)| (stack.clone(), checksum.clone()))
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> InfraMachine {
        InfraMachine::new(true, true, vec![PathBuf::from("/app/infra/app.ts")], ChecksumMap::default())
    }

    fn synth_output(stacks: &[(&str, &str)]) -> SynthOutput {
        SynthOutput {
            assembly_dir: None,
            checksums: stacks
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_disabled_machine_ignores_edits() {
        let mut machine = InfraMachine::new(false, true, vec![], ChecksumMap::default());
        assert_eq!(machine.on_edit(), None);
        assert_eq!(machine.state(), CdkState::Idle);
    }

    #[test]
    fn test_edit_starts_build() {
        let mut machine = machine();
        assert_eq!(machine.on_edit(), Some(InfraAction::StartBuild));
        assert_eq!(machine.state(), CdkState::Building);
    }

    #[test]
    fn test_happy_path_to_approval() {
        let mut machine = machine();
        machine.on_edit();
        assert_eq!(machine.on_build_ok(), Some(InfraAction::StartSynth));
        assert_eq!(machine.state(), CdkState::Synthesizing);

        let action = machine.on_synth_done(Ok(synth_output(&[("api", "aaa")])));
        assert_eq!(action, None);
        assert_eq!(machine.state(), CdkState::AwaitingApproval);

        let action = machine.on_input();
        let Some(InfraAction::StartDeploy(changed)) = action else {
            panic!("expected deploy action");
        };
        assert_eq!(changed.len(), 1);
        assert_eq!(machine.state(), CdkState::Deploying);

        assert_eq!(machine.on_deploy_done(true), None);
        assert_eq!(machine.state(), CdkState::Idle);
    }

    #[test]
    fn test_edits_coalesce_during_synth() {
        let mut machine = machine();
        machine.on_edit();
        machine.on_build_ok();
        assert_eq!(machine.state(), CdkState::Synthesizing);

        // Three edits while synthesizing: one dirty latch.
        assert_eq!(machine.on_edit(), None);
        assert_eq!(machine.on_edit(), None);
        assert_eq!(machine.on_edit(), None);

        // Synth completes; exactly one follow-up rebuild.
        let action = machine.on_synth_done(Ok(synth_output(&[("api", "aaa")])));
        assert_eq!(action, Some(InfraAction::StartBuild));
        assert_eq!(machine.state(), CdkState::Building);

        // Latch was cleared: completing cleanly goes forward, not back.
        assert_eq!(machine.on_build_ok(), Some(InfraAction::StartSynth));
    }

    #[test]
    fn test_cancelled_synth_is_not_an_error() {
        let mut machine = machine();
        machine.on_edit();
        machine.on_build_ok();

        let action = machine.on_synth_done(Err(SynthError::Cancelled));
        assert_eq!(action, Some(InfraAction::StartBuild));
        assert_eq!(machine.state(), CdkState::Building);
    }

    #[test]
    fn test_synth_failure_waits_for_next_edit() {
        let mut machine = machine();
        machine.on_edit();
        machine.on_build_ok();

        assert_eq!(machine.on_synth_done(Err(SynthError::Failed("boom".into()))), None);
        assert_eq!(machine.state(), CdkState::SynthFailed);

        assert_eq!(machine.on_edit(), Some(InfraAction::StartBuild));
    }

    #[test]
    fn test_edit_discards_pending_approval() {
        let mut machine = machine();
        machine.on_edit();
        machine.on_build_ok();
        machine.on_synth_done(Ok(synth_output(&[("api", "aaa")])));
        assert_eq!(machine.state(), CdkState::AwaitingApproval);

        assert_eq!(machine.on_edit(), Some(InfraAction::StartBuild));
        // The discarded approval cannot be resurrected by the input key.
        machine.dirty = false;
        assert_eq!(machine.on_input(), None);
    }

    #[test]
    fn test_input_outside_approval_is_ignored() {
        let mut machine = machine();
        assert_eq!(machine.on_input(), None);
        machine.on_edit();
        assert_eq!(machine.on_input(), None);
    }

    #[test]
    fn test_deploy_narrows_to_changed_stacks() {
        let mut machine = machine();
        machine.deployed = synth_output(&[("api", "aaa"), ("db", "bbb")]).checksums;

        machine.on_edit();
        machine.on_build_ok();
        machine.on_synth_done(Ok(synth_output(&[("api", "aaa"), ("db", "ccc"), ("new", "ddd")])));

        let Some(InfraAction::StartDeploy(changed)) = machine.on_input() else {
            panic!("expected deploy action");
        };
        assert_eq!(changed.len(), 2);
        assert!(changed.contains_key("db"));
        assert!(changed.contains_key("new"));
        assert!(!changed.contains_key("api"));
    }

    #[test]
    fn test_deploy_success_updates_deployed_checksums() {
        let mut machine = machine();
        machine.on_edit();
        machine.on_build_ok();
        machine.on_synth_done(Ok(synth_output(&[("api", "aaa")])));
        machine.on_input();
        machine.on_deploy_done(true);

        assert_eq!(machine.deployed.get("api").map(String::as_str), Some("aaa"));
    }

    #[test]
    fn test_deploy_failure_keeps_old_checksums() {
        let mut machine = machine();
        machine.deployed = synth_output(&[("api", "old")]).checksums;
        machine.on_edit();
        machine.on_build_ok();
        machine.on_synth_done(Ok(synth_output(&[("api", "new")])));
        machine.on_input();
        machine.on_deploy_done(false);

        assert_eq!(machine.state(), CdkState::Idle);
        assert_eq!(machine.deployed.get("api").map(String::as_str), Some("old"));
    }

    #[test]
    fn test_edits_during_deploy_coalesce() {
        let mut machine = machine();
        machine.on_edit();
        machine.on_build_ok();
        machine.on_synth_done(Ok(synth_output(&[("api", "aaa")])));
        machine.on_input();
        assert_eq!(machine.state(), CdkState::Deploying);

        machine.on_edit();
        machine.on_edit();

        assert_eq!(machine.on_deploy_done(true), Some(InfraAction::StartBuild));
        assert_eq!(machine.state(), CdkState::Building);
    }

    #[test]
    fn test_auto_approve_skips_gate() {
        let mut machine =
            InfraMachine::new(true, false, vec![PathBuf::from("/app/infra/app.ts")], ChecksumMap::default());
        machine.on_edit();
        machine.on_build_ok();

        let action = machine.on_synth_done(Ok(synth_output(&[("api", "aaa")])));
        assert!(matches!(action, Some(InfraAction::StartDeploy(_))));
        assert_eq!(machine.state(), CdkState::Deploying);
    }

    #[test]
    fn test_input_diffing() {
        let mut machine = machine();
        let (added, removed) = machine.set_input_files(
            [
                PathBuf::from("/app/infra/app.ts"),
                PathBuf::from("/app/infra/stacks.ts"),
            ]
            .into_iter()
            .collect(),
        );
        assert_eq!(added, vec![PathBuf::from("/app/infra/stacks.ts")]);
        assert!(removed.is_empty());

        let (added, removed) =
            machine.set_input_files([PathBuf::from("/app/infra/app.ts")].into_iter().collect());
        assert!(added.is_empty());
        assert_eq!(removed, vec![PathBuf::from("/app/infra/stacks.ts")]);
    }
}
