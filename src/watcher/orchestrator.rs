//! Orchestrator - the single owner of all watcher state.
//!
//! One control task owns the registries, the file index, and both state
//! machines. Every stimulus arrives as a [`WatchEvent`]; handlers mutate
//! state, then run one reconciliation pass (`scheduler.rs`). No lock is
//! held across an external operation and no two passes overlap.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use rustc_hash::FxHashMap;
use tokio::sync::mpsc;

use crate::build::{BuildError, BuildOutput, Toolchain};
use crate::config::AppConfig;
use crate::core::{RebuildPriority, RuntimeKind};
use crate::utils::path::is_under_node_modules;

use super::checks::{color_enabled, command_from_argv, spawn_checker};
use super::fs::WatchSet;
use super::infra::{InfraAction, InfraHost, InfraMachine, SynthError, SynthOutput};
use super::messages::{
    BuiltHandler, CheckScope, CheckerKind, EntryPointState, RequestError, SourcePathState,
    StateSnapshot, WatchEvent,
};
use super::registry::{EntryPoint, EntryPointKey, FileIndex, SourcePath};
use super::status::StatusReporter;

pub(super) struct Orchestrator {
    pub(super) config: Arc<AppConfig>,
    pub(super) toolchain: Arc<dyn Toolchain>,
    pub(super) host: Arc<dyn InfraHost>,

    pub(super) entries: FxHashMap<EntryPointKey, EntryPoint>,
    /// Registration order, for deterministic iteration.
    pub(super) order: Vec<EntryPointKey>,
    pub(super) sources: FxHashMap<String, SourcePath>,
    pub(super) file_index: FileIndex,
    pub(super) infra: InfraMachine,

    pub(super) watch_set: WatchSet,
    pub(super) status: StatusReporter,

    pub(super) rx: mpsc::Receiver<WatchEvent>,
    pub(super) tx: mpsc::Sender<WatchEvent>,

    /// Go builds currently in flight (bounded by `go_cap`).
    pub(super) running_go: usize,
    pub(super) go_cap: usize,
    /// Monotonic stamp source for dirty ordering.
    pub(super) dirty_seq: u64,
    /// Generation source for checker handles.
    pub(super) checker_seq: u64,
}

impl Orchestrator {
    /// Main event loop. Runs until `Shutdown` or channel closure.
    pub async fn run(mut self) {
        self.reconcile(false);

        while let Some(event) = self.rx.recv().await {
            if !self.handle_event(event) {
                break;
            }
        }

        self.shutdown();
    }

    /// Process one event. Returns `false` on shutdown.
    fn handle_event(&mut self, event: WatchEvent) -> bool {
        match event {
            WatchEvent::PathsChanged(paths) => self.on_paths_changed(paths),
            WatchEvent::BuildFinished {
                key,
                started,
                result,
            } => self.on_build_finished(&key, started, result),
            WatchEvent::InfraBuildFinished { result } => self.on_infra_build_finished(result),
            WatchEvent::SynthFinished(result) => self.on_synth_finished(result),
            WatchEvent::DeployFinished { ok } => {
                let action = self.infra.on_deploy_done(ok);
                self.run_infra_action(action);
                self.reconcile(false);
            }
            WatchEvent::Request {
                src_path,
                handler,
                reply,
            } => self.on_request(&src_path, &handler, reply),
            WatchEvent::CheckerExited { scope, kind, id } => self.on_checker_exited(scope, kind, id),
            WatchEvent::Input => {
                let action = self.infra.on_input();
                self.run_infra_action(action);
                self.reconcile(false);
            }
            WatchEvent::GetState(reply) => {
                let _ = reply.send(self.snapshot());
            }
            WatchEvent::Shutdown => return false,
        }
        true
    }

    // -------------------------------------------------------------------------
    // File-change fan-out
    // -------------------------------------------------------------------------

    fn on_paths_changed(&mut self, paths: Vec<PathBuf>) {
        let mut infra_edited = false;

        for path in &paths {
            let mut matched = false;

            if path.extension().is_some_and(|ext| ext == "go") {
                // Coarse dependency model: every go entry point is dirty.
                let keys: Vec<_> = self
                    .order
                    .iter()
                    .filter(|key| self.entries[*key].runtime == RuntimeKind::Go)
                    .cloned()
                    .collect();
                matched = !keys.is_empty();
                for key in &keys {
                    self.mark_dirty(key, RebuildPriority::Low);
                }
            } else {
                let keys = self.file_index.lookup(path).to_vec();
                matched = !keys.is_empty();
                for key in &keys {
                    self.mark_dirty(key, RebuildPriority::Low);
                }
            }

            if self.infra.is_input(path) {
                infra_edited = true;
                matched = true;
            }

            if !matched {
                crate::debug!("watch"; "ignored: {}", path.display());
            }
        }

        // One debounced batch is one edit to the infra machine; events
        // arriving while a phase is in flight coalesce inside it.
        if infra_edited {
            let action = self.infra.on_edit();
            self.run_infra_action(action);
        }

        self.reconcile(false);
    }

    fn mark_dirty(&mut self, key: &EntryPointKey, priority: RebuildPriority) {
        self.dirty_seq += 1;
        if let Some(ep) = self.entries.get_mut(key) {
            ep.mark_dirty(priority, self.dirty_seq);
        }
    }

    // -------------------------------------------------------------------------
    // Build outcomes
    // -------------------------------------------------------------------------

    fn on_build_finished(
        &mut self,
        key: &EntryPointKey,
        started: SystemTime,
        result: Result<BuildOutput, BuildError>,
    ) {
        if self
            .entries
            .get(key)
            .is_some_and(|ep| ep.runtime == RuntimeKind::Go)
        {
            self.running_go = self.running_go.saturating_sub(1);
        }

        let failed = result.is_err();
        match result {
            Ok(output) => self.apply_build_success(key, started, output),
            Err(e) => self.apply_build_failure(key, &e),
        }

        self.reconcile(failed);
    }

    /// Record a successful build: swap in the new artifact and input set,
    /// update index and watch set, then wake waiters if nothing made the
    /// entry dirty again in the meantime.
    pub(super) fn apply_build_success(
        &mut self,
        key: &EntryPointKey,
        started: SystemTime,
        output: BuildOutput,
    ) {
        let Some(ep) = self.entries.get_mut(key) else {
            return;
        };

        ep.build_started = None;
        ep.has_error = false;

        let added: Vec<PathBuf> = output
            .input_files
            .difference(&ep.input_files)
            .cloned()
            .collect();
        let removed: Vec<PathBuf> = ep
            .input_files
            .difference(&output.input_files)
            .cloned()
            .collect();

        ep.artifact = Some(output.artifact);
        ep.input_files = output.input_files;
        let runtime = ep.runtime;
        let src_path = ep.src_path.clone();
        let tsconfig = ep.tsconfig.clone();

        if runtime == RuntimeKind::Node {
            for file in &added {
                self.file_index.add(file.clone(), key);
            }
            for file in &removed {
                self.file_index.remove(file, key);
            }
        }

        // Watch-set updates go out before any waiter wakes.
        let unwatch: Vec<PathBuf> = removed
            .into_iter()
            .filter(|f| !self.file_index.contains_file(f) && !self.infra.input_files().contains(f))
            .collect();
        self.watch_set.remove(unwatch);

        // Files edited between build start and completion predate their
        // watch registration; schedule a rebuild so the edits are not lost.
        let raced = added.iter().any(|file| {
            std::fs::metadata(file)
                .and_then(|meta| meta.modified())
                .is_ok_and(|mtime| mtime > started)
        });
        self.watch_set.add(added);
        if raced {
            self.mark_dirty(key, RebuildPriority::Low);
        }

        let Some(ep) = self.entries.get_mut(key) else {
            return;
        };
        if !ep.priority.is_dirty()
            && let Some(built) = ep.built_handler()
        {
            while let Some(waiter) = ep.waiters.pop_front() {
                let _ = waiter.send(Ok(built.clone()));
            }
        }
        // else: the entry is dirty again; waiters stay queued for the
        // next successful build.

        let source = self
            .sources
            .entry(src_path.clone())
            .or_insert_with(|| SourcePath::new(src_path, tsconfig.clone()));
        if source.tsconfig.is_none() {
            source.tsconfig = tsconfig;
        }
        source.needs_recheck = true;
    }

    pub(super) fn apply_build_failure(&mut self, key: &EntryPointKey, error: &BuildError) {
        crate::log!("build"; "{} failed: {}", key, error);

        let Some(ep) = self.entries.get_mut(key) else {
            return;
        };
        ep.build_started = None;
        ep.has_error = true;
        // All waiters are rejected below, so a request-elevated priority
        // must not survive the failure; the next edit re-marks the entry.
        ep.priority = RebuildPriority::Off;

        let message = error.to_string();
        while let Some(waiter) = ep.waiters.pop_front() {
            let _ = waiter.send(Err(RequestError::BuildFailed {
                key: key.to_string(),
                message: message.clone(),
            }));
        }
    }

    // -------------------------------------------------------------------------
    // On-demand requests
    // -------------------------------------------------------------------------

    fn on_request(
        &mut self,
        src_path: &str,
        handler: &str,
        reply: tokio::sync::oneshot::Sender<Result<BuiltHandler, RequestError>>,
    ) {
        let key = EntryPointKey::new(src_path, handler);

        let clean = match self.entries.get(&key) {
            None => {
                let _ = reply.send(Err(RequestError::UnknownHandler(key.to_string())));
                return;
            }
            Some(ep) => ep.is_clean() && !ep.has_error,
        };

        if clean
            && let Some(built) = self.entries[&key].built_handler()
        {
            let _ = reply.send(Ok(built));
            return;
        }

        // Dirty, building, errored, or never built: elevate to high
        // priority and park the caller until the next build resolves.
        if let Some(ep) = self.entries.get_mut(&key) {
            ep.waiters.push_back(reply);
        }
        self.mark_dirty(&key, RebuildPriority::High);
        self.reconcile(false);
    }

    // -------------------------------------------------------------------------
    // Infra subsystem
    // -------------------------------------------------------------------------

    fn on_infra_build_finished(&mut self, result: Result<BuildOutput, BuildError>) {
        let action = match result {
            Ok(output) => {
                let (added, removed) = self.infra.set_input_files(output.input_files);
                let unwatch: Vec<PathBuf> = removed
                    .into_iter()
                    .filter(|f| !self.file_index.contains_file(f))
                    .collect();
                self.watch_set.add(added);
                self.watch_set.remove(unwatch);

                self.restart_infra_checks();
                self.infra.on_build_ok()
            }
            Err(e) => {
                crate::log!("infra"; "build failed: {}", e);
                self.infra.on_build_err()
            }
        };

        self.run_infra_action(action);
        self.reconcile(false);
    }

    fn on_synth_finished(&mut self, result: Result<SynthOutput, SynthError>) {
        if let Err(SynthError::Failed(message)) = &result {
            crate::log!("infra"; "synth failed: {}", message);
        }
        let action = self.infra.on_synth_done(result);
        self.run_infra_action(action);
        self.reconcile(false);
    }

    pub(super) fn run_infra_action(&mut self, action: Option<InfraAction>) {
        match action {
            Some(InfraAction::StartBuild) => {
                let Some(entry) = self.config.infra.entry.clone() else {
                    return;
                };
                let toolchain = Arc::clone(&self.toolchain);
                let app_path = self.config.app_path.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result =
                        tokio::task::spawn_blocking(move || toolchain.build_infra(&app_path, &entry))
                            .await
                            .unwrap_or_else(|e| {
                                Err(BuildError(format!("infra build task failed: {e}")))
                            });
                    let _ = tx.send(WatchEvent::InfraBuildFinished { result }).await;
                });
            }
            Some(InfraAction::StartSynth) => {
                let host = Arc::clone(&self.host);
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = tokio::task::spawn_blocking(move || host.synth())
                        .await
                        .unwrap_or_else(|e| Err(SynthError::Failed(format!("synth task failed: {e}"))));
                    let _ = tx.send(WatchEvent::SynthFinished(result)).await;
                });
            }
            Some(InfraAction::StartDeploy(changed)) => {
                crate::log!("deploy"; "deploying {} changed stack(s)", changed.len());
                let host = Arc::clone(&self.host);
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let ok = match tokio::task::spawn_blocking(move || host.deploy(&changed)).await {
                        Ok(Ok(())) => true,
                        Ok(Err(e)) => {
                            crate::log!("deploy"; "failed: {}", e);
                            false
                        }
                        Err(e) => {
                            crate::log!("deploy"; "task failed: {}", e);
                            false
                        }
                    };
                    let _ = tx.send(WatchEvent::DeployFinished { ok }).await;
                });
            }
            None => {}
        }
    }

    /// Kill and relaunch the infra checkers over the fresh input set,
    /// same policy as source paths but scoped to the infra files.
    fn restart_infra_checks(&mut self) {
        if let Some(lint) = &mut self.infra.lint {
            lint.kill();
        }
        if let Some(typecheck) = &mut self.infra.typecheck {
            typecheck.kill();
        }

        let mut lint_files: Vec<PathBuf> = self
            .infra
            .input_files()
            .iter()
            .filter(|f| !is_under_node_modules(f))
            .filter(|f| f.extension().is_some_and(|ext| ext == "ts" || ext == "js"))
            .cloned()
            .collect();
        lint_files.sort();
        let has_ts = lint_files
            .iter()
            .any(|f| f.extension().is_some_and(|ext| ext == "ts"));

        if self.config.checks.lint && !lint_files.is_empty() {
            self.checker_seq += 1;
            let id = self.checker_seq;
            if let Some(mut cmd) = command_from_argv(&self.config.checks.lint_command) {
                cmd.arg(if color_enabled() { "--color" } else { "--no-color" });
                cmd.args(&lint_files);
                cmd.current_dir(&self.config.app_path);
                self.infra.lint =
                    spawn_checker(cmd, CheckScope::Infra, CheckerKind::Lint, id, self.tx.clone());
            }
        }

        let tsconfig = self.config.app_path.join("tsconfig.json");
        if self.config.checks.typecheck && has_ts && tsconfig.is_file() {
            self.checker_seq += 1;
            let id = self.checker_seq;
            if let Some(mut cmd) = command_from_argv(&self.config.checks.typecheck_command) {
                cmd.arg("--noEmit")
                    .arg("--pretty")
                    .arg(if color_enabled() { "true" } else { "false" });
                cmd.current_dir(&self.config.app_path);
                self.infra.typecheck = spawn_checker(
                    cmd,
                    CheckScope::Infra,
                    CheckerKind::TypeCheck,
                    id,
                    self.tx.clone(),
                );
            }
        }
    }

    // -------------------------------------------------------------------------
    // Checker exits
    // -------------------------------------------------------------------------

    fn on_checker_exited(&mut self, scope: CheckScope, kind: CheckerKind, id: u64) {
        let slot = match &scope {
            CheckScope::Source(src) => self.sources.get_mut(src).map(|sp| match kind {
                CheckerKind::Lint => &mut sp.lint,
                CheckerKind::TypeCheck => &mut sp.typecheck,
            }),
            CheckScope::Infra => Some(match kind {
                CheckerKind::Lint => &mut self.infra.lint,
                CheckerKind::TypeCheck => &mut self.infra.typecheck,
            }),
        };

        // A stale exit (an older generation we already replaced) must not
        // clear the live handle.
        if let Some(slot) = slot
            && slot.as_ref().is_some_and(|handle| handle.id == id)
        {
            *slot = None;
        }

        self.reconcile(false);
    }

    // -------------------------------------------------------------------------
    // Snapshot + shutdown
    // -------------------------------------------------------------------------

    fn snapshot(&self) -> StateSnapshot {
        let entry_points = self
            .order
            .iter()
            .map(|key| {
                let ep = &self.entries[key];
                EntryPointState {
                    key: key.to_string(),
                    runtime: ep.runtime.label(),
                    has_error: ep.has_error,
                    building: ep.building(),
                    priority: ep.priority.label(),
                    pending_requests: ep.waiters.len(),
                }
            })
            .collect();

        let mut source_paths: Vec<SourcePathState> = self
            .sources
            .values()
            .map(|sp| SourcePathState {
                src_path: sp.src_path.clone(),
                needs_recheck: sp.needs_recheck,
                lint_running: sp.lint.is_some(),
                typecheck_running: sp.typecheck.is_some(),
            })
            .collect();
        source_paths.sort_by(|a, b| a.src_path.cmp(&b.src_path));

        let handlers_busy = self.handlers_busy();
        let infra_busy = self.infra.state() != super::infra::CdkState::Idle;

        StateSnapshot {
            entry_points,
            source_paths,
            infra_state: self.infra.state().label(),
            handlers_busy,
            infra_busy,
            is_busy: handlers_busy || infra_busy,
        }
    }

    fn shutdown(&mut self) {
        for source in self.sources.values_mut() {
            source.kill_checkers();
        }
        if let Some(lint) = &mut self.infra.lint {
            lint.kill();
        }
        if let Some(typecheck) = &mut self.infra.typecheck {
            typecheck.kill();
        }

        for ep in self.entries.values_mut() {
            while let Some(waiter) = ep.waiters.pop_front() {
                let _ = waiter.send(Err(RequestError::Stopped));
            }
        }

        crate::debug!("watch"; "stopped");
    }
}
