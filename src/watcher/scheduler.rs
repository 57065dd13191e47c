//! The reconciliation pass.
//!
//! Runs after every state transition: classifies entry points, dispatches
//! new builds under the per-runtime rules, gates checker launches, and
//! edge-reports the busy status. Reconciling twice with no intervening
//! events produces no new side effects.
//!
//! Dispatch rules:
//! - node-like: every dirty entry rebuilds immediately, in parallel
//! - go-like: bounded by the hardware-thread cap; high priority jumps the
//!   queue but never preempts a running build
//! - python-like: no build step, the transition is synchronous

use std::cmp::Reverse;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use rustc_hash::{FxHashSet, FxHashMap};

use crate::build::BuildError;
use crate::core::{RebuildPriority, RuntimeKind};
use crate::logger;
use crate::utils::path::is_under_node_modules;

use super::checks::{color_enabled, command_from_argv, spawn_checker};
use super::infra::CdkState;
use super::messages::{CheckScope, CheckerKind, WatchEvent};
use super::orchestrator::Orchestrator;
use super::registry::EntryPointKey;
use super::status::Edge;

impl Orchestrator {
    /// One reconciliation pass.
    ///
    /// `failed_pass` is set when the event that triggered the pass was a
    /// build failure: checker launches are skipped for the whole pass and
    /// retried on the next one.
    pub(super) fn reconcile(&mut self, failed_pass: bool) {
        self.kill_stale_checkers();
        self.dispatch_python();
        self.dispatch_node();
        self.dispatch_go();
        if !failed_pass {
            self.launch_pending_checks();
        }
        self.report_edges();
    }

    // -------------------------------------------------------------------------
    // Checker staleness
    // -------------------------------------------------------------------------

    /// A checker is stale the moment its source path stops being clean;
    /// kill it now, relaunch after the next successful build.
    fn kill_stale_checkers(&mut self) {
        let unclean: FxHashSet<&str> = self
            .entries
            .values()
            .filter(|ep| !ep.is_clean() || ep.has_error)
            .map(|ep| ep.src_path.as_str())
            .collect();

        for (src_path, source) in &mut self.sources {
            if unclean.contains(src_path.as_str()) && source.has_live_checker() {
                crate::debug!("check"; "killing stale checkers for {}", src_path);
                source.kill_checkers();
            }
        }
    }

    // -------------------------------------------------------------------------
    // Dispatch
    // -------------------------------------------------------------------------

    fn dirty_keys(&self, runtime: RuntimeKind) -> Vec<EntryPointKey> {
        self.order
            .iter()
            .filter(|key| {
                let ep = &self.entries[*key];
                ep.runtime == runtime && ep.priority.is_dirty() && !ep.building()
            })
            .cloned()
            .collect()
    }

    /// Python has no build step: complete the transition inside the pass.
    fn dispatch_python(&mut self) {
        for key in self.dirty_keys(RuntimeKind::Python) {
            let request = self.entries[&key].request.clone();
            let started = SystemTime::now();

            if let Some(ep) = self.entries.get_mut(&key) {
                ep.priority = RebuildPriority::Off;
            }

            let result = self.toolchain.build(&request);
            match result {
                Ok(output) => self.apply_build_success(&key, started, output),
                Err(e) => self.apply_build_failure(&key, &e),
            }
        }
    }

    fn dispatch_node(&mut self) {
        for key in self.dirty_keys(RuntimeKind::Node) {
            self.dispatch_build(&key);
        }
    }

    fn dispatch_go(&mut self) {
        let mut dirty: Vec<(EntryPointKey, RebuildPriority, u64)> = self
            .dirty_keys(RuntimeKind::Go)
            .into_iter()
            .map(|key| {
                let ep = &self.entries[&key];
                (key.clone(), ep.priority, ep.dirty_seq)
            })
            .collect();

        // High priority first; insertion order among equals.
        dirty.sort_by_key(|(_, priority, seq)| (Reverse(*priority), *seq));

        for (key, ..) in dirty {
            if self.running_go >= self.go_cap {
                break;
            }
            self.dispatch_build(&key);
            self.running_go += 1;
        }
    }

    /// Hand one entry point to the toolchain on a blocking worker.
    ///
    /// Priority resets at dispatch: edits landing while the build runs
    /// re-raise it, and the completion handler reads the fresh value.
    fn dispatch_build(&mut self, key: &EntryPointKey) {
        let Some(ep) = self.entries.get_mut(key) else {
            return;
        };

        let started = SystemTime::now();
        ep.build_started = Some(started);
        ep.priority = RebuildPriority::Off;
        let request = ep.request.clone();

        crate::debug!("build"; "dispatch {}", key);

        let toolchain = Arc::clone(&self.toolchain);
        let tx = self.tx.clone();
        let key = key.clone();
        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || toolchain.build(&request))
                .await
                .unwrap_or_else(|e| Err(BuildError(format!("build task failed: {e}"))));
            let _ = tx
                .send(WatchEvent::BuildFinished {
                    key,
                    started,
                    result,
                })
                .await;
        });
    }

    // -------------------------------------------------------------------------
    // Checker launches
    // -------------------------------------------------------------------------

    fn launch_pending_checks(&mut self) {
        let clean: FxHashMap<&str, bool> = {
            let mut map: FxHashMap<&str, bool> = FxHashMap::default();
            for ep in self.entries.values() {
                let entry = map.entry(ep.src_path.as_str()).or_insert(true);
                *entry = *entry && ep.is_clean() && !ep.has_error;
            }
            map
        };

        let ready: Vec<String> = self
            .sources
            .iter()
            .filter(|(src, sp)| sp.needs_recheck && clean.get(src.as_str()).copied().unwrap_or(false))
            .map(|(src, _)| src.clone())
            .collect();

        for src_path in ready {
            self.launch_checks(&src_path);
        }
    }

    /// Start lint and type-check for one source path, terminating any
    /// prior processes first (they are operating on stale inputs).
    fn launch_checks(&mut self, src_path: &str) {
        // Union of the current input files across this source path's
        // entry points, third-party modules excluded.
        let mut lint_files: Vec<PathBuf> = {
            let mut set = FxHashSet::default();
            for ep in self.entries.values().filter(|ep| ep.src_path == src_path) {
                for file in &ep.input_files {
                    if is_under_node_modules(file) {
                        continue;
                    }
                    if file.extension().is_some_and(|ext| ext == "ts" || ext == "js") {
                        set.insert(file.clone());
                    }
                }
            }
            set.into_iter().collect()
        };
        lint_files.sort();
        let has_ts = lint_files
            .iter()
            .any(|f| f.extension().is_some_and(|ext| ext == "ts"));

        let lint_enabled = self.config.checks.lint && !lint_files.is_empty();
        let lint_id = {
            self.checker_seq += 1;
            self.checker_seq
        };
        let typecheck_id = {
            self.checker_seq += 1;
            self.checker_seq
        };

        let lint_cmd = lint_enabled
            .then(|| command_from_argv(&self.config.checks.lint_command))
            .flatten()
            .map(|mut cmd| {
                cmd.arg(if color_enabled() { "--color" } else { "--no-color" });
                cmd.args(&lint_files);
                cmd.current_dir(&self.config.app_path);
                cmd
            });

        let src_dir = self.config.src_dir(src_path);
        let typecheck_enabled = self.config.checks.typecheck && has_ts;
        let typecheck_argv = self.config.checks.typecheck_command.clone();
        let tx = self.tx.clone();

        let Some(source) = self.sources.get_mut(src_path) else {
            return;
        };
        source.needs_recheck = false;
        source.kill_checkers();

        if let Some(cmd) = lint_cmd {
            source.lint = spawn_checker(
                cmd,
                CheckScope::Source(src_path.to_string()),
                CheckerKind::Lint,
                lint_id,
                tx.clone(),
            );
        }

        if typecheck_enabled
            && source.tsconfig.is_some()
            && let Some(mut cmd) = command_from_argv(&typecheck_argv)
        {
            cmd.arg("--noEmit")
                .arg("--pretty")
                .arg(if color_enabled() { "true" } else { "false" });
            cmd.current_dir(&src_dir);
            source.typecheck = spawn_checker(
                cmd,
                CheckScope::Source(src_path.to_string()),
                CheckerKind::TypeCheck,
                typecheck_id,
                tx,
            );
        }
    }

    // -------------------------------------------------------------------------
    // Busy status
    // -------------------------------------------------------------------------

    pub(super) fn handlers_busy(&self) -> bool {
        self.entries
            .values()
            .any(|ep| ep.building() || ep.priority.is_dirty())
            || self
                .sources
                .values()
                .any(|sp| sp.needs_recheck || sp.has_live_checker())
    }

    fn report_edges(&mut self) {
        if let Some(edge) = self.status.handlers(self.handlers_busy()) {
            match edge {
                Edge::Rising => logger::status_progress("Rebuilding code..."),
                Edge::Falling => {
                    if self.entries.values().any(|ep| ep.has_error) {
                        logger::status_error("Rebuilding code failed", "");
                    } else {
                        logger::status_success("Done building code");
                    }
                }
            }
        }

        let state = self.infra.state();
        if let Some(edge) = self.status.infra(state.is_active()) {
            match edge {
                Edge::Rising => logger::status_progress("Rebuilding infrastructure..."),
                Edge::Falling => match state {
                    CdkState::Idle => logger::status_success("Done deploying infrastructure"),
                    CdkState::AwaitingApproval => {
                        logger::status_prompt("Press ENTER to redeploy infrastructure")
                    }
                    CdkState::BuildFailed => {
                        logger::status_error("Rebuilding infrastructure failed", "")
                    }
                    CdkState::SynthFailed => {
                        logger::status_error("Synthesizing infrastructure failed", "")
                    }
                    _ => {}
                },
            }
        }
    }
}
