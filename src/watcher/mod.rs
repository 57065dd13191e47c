//! Live rebuild orchestrator.
//!
//! Watches two disjoint bodies of source code - handler code for
//! individually deployed function units, and infrastructure code - and
//! reacts to edits by incrementally rebuilding, checking, and
//! conditionally redeploying.
//!
//! ```text
//! FsActor ──PathsChanged──► Orchestrator ──► builds / checkers
//! (watch)                   (registries,     (child processes,
//!                            scheduler,       blocking workers)
//!                            infra machine)
//! ```
//!
//! # Module Structure
//!
//! - `messages` - event types consumed by the control loop
//! - `registry` - entry-point/source-path records and the file index
//! - `orchestrator` - the single state owner and its event handlers
//! - `scheduler` - the reconciliation pass and dispatch rules
//! - `checks` - lint/type-check child-process plumbing
//! - `infra` - the rebuild→synth→deploy state machine
//! - `status` - busy-bit edge detection
//! - `fs` - debounced file watcher and watch-set maintenance
//! - `handle` - the public, channel-backed API

mod checks;
mod fs;
mod handle;
mod messages;
mod orchestrator;
mod registry;
mod scheduler;
mod status;

pub mod infra;


pub use handle::WatcherHandle;
pub use messages::{BuiltHandler, RequestError, StateSnapshot};
pub use registry::EntryPointKey;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;

use crate::build::{BuildError, Toolchain};
use crate::config::AppConfig;
use crate::core::RuntimeKind;

use fs::{FsActor, WatchSet};
use infra::{ChecksumMap, InfraHost, InfraMachine};
use messages::WatchEvent;
use orchestrator::Orchestrator;
use registry::{EntryPoint, FileIndex, SourcePath};
use status::StatusReporter;

const CHANNEL_BUFFER: usize = 64;

/// The live rebuild orchestrator, before it starts.
pub struct DevWatcher {
    config: Arc<AppConfig>,
    toolchain: Arc<dyn Toolchain>,
    host: Arc<dyn InfraHost>,
    checksums: ChecksumMap,
}

impl DevWatcher {
    pub fn new(
        config: Arc<AppConfig>,
        toolchain: Arc<dyn Toolchain>,
        host: Arc<dyn InfraHost>,
    ) -> Self {
        Self {
            config,
            toolchain,
            host,
            checksums: ChecksumMap::default(),
        }
    }

    /// Seed the last-known per-stack checksums (narrows the first deploy).
    pub fn with_checksums(mut self, checksums: ChecksumMap) -> Self {
        self.checksums = checksums;
        self
    }

    /// Build every handler once, install the watcher, and start the
    /// control loop. With `is_test` no watcher is installed; changes are
    /// injected through [`WatcherHandle::notify_changed`].
    pub async fn start(self, is_test: bool) -> Result<WatcherHandle> {
        let config = self.config;

        if config.handlers.is_empty() {
            bail!("No Lambda handlers are found in the app");
        }

        let mut records: Vec<EntryPoint> = config
            .handlers
            .iter()
            .map(|handler| EntryPoint::new(&config, handler))
            .collect();

        initial_build(&mut records, &self.toolchain, config.builder_concurrency()).await?;
        crate::log!("build"; "built {} handler(s)", records.len());

        // Populate registries from the first successful builds.
        let mut entries = FxHashMap::default();
        let mut order = Vec::with_capacity(records.len());
        let mut sources: FxHashMap<String, SourcePath> = FxHashMap::default();
        let mut file_index = FileIndex::default();

        for ep in records {
            if ep.runtime == RuntimeKind::Node {
                for file in &ep.input_files {
                    file_index.add(file.clone(), &ep.key);
                }
            }

            let source = sources
                .entry(ep.src_path.clone())
                .or_insert_with(|| SourcePath::new(ep.src_path.clone(), ep.tsconfig.clone()));
            if source.tsconfig.is_none() {
                source.tsconfig = ep.tsconfig.clone();
            }
            source.needs_recheck = true;

            order.push(ep.key.clone());
            entries.insert(ep.key.clone(), ep);
        }

        let (tx, rx) = mpsc::channel::<WatchEvent>(CHANNEL_BUFFER);

        let watch_set = if is_test {
            WatchSet::disabled()
        } else {
            let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

            let mut files: Vec<PathBuf> = entries
                .values()
                .flat_map(|ep| ep.input_files.iter().cloned())
                .collect();
            files.extend(config.infra_input_files());

            let actor = FsActor::new(
                config.app_path.clone(),
                config.out_dir(),
                files,
                tx.clone(),
                cmd_rx,
            )
            .map_err(|e| anyhow::anyhow!("watcher failed: {}", e))?;
            tokio::spawn(actor.run());

            crate::log!("watch"; "watching {}", config.app_path.display());
            WatchSet::new(cmd_tx)
        };

        let infra = InfraMachine::new(
            config.infra.entry.is_some(),
            config.infra.require_approval,
            config.infra_input_files(),
            self.checksums,
        );

        let go_cap = config.builder_concurrency();
        let orchestrator = Orchestrator {
            config,
            toolchain: self.toolchain,
            host: self.host,
            entries,
            order,
            sources,
            file_index,
            infra,
            watch_set,
            status: StatusReporter::default(),
            rx,
            tx: tx.clone(),
            running_go: 0,
            go_cap,
            dirty_seq: 0,
            checker_seq: 0,
        };
        tokio::spawn(orchestrator.run());

        Ok(WatcherHandle { tx })
    }
}

/// Build every entry point once, go builds bounded by the concurrency
/// cap. Any failure fails startup.
async fn initial_build(
    records: &mut [EntryPoint],
    toolchain: &Arc<dyn Toolchain>,
    go_cap: usize,
) -> Result<()> {
    let semaphore = Arc::new(tokio::sync::Semaphore::new(go_cap.max(1)));
    let mut set = tokio::task::JoinSet::new();

    for (idx, ep) in records.iter().enumerate() {
        let request = ep.request.clone();
        let toolchain = Arc::clone(toolchain);
        let gate = (ep.runtime == RuntimeKind::Go).then(|| Arc::clone(&semaphore));

        set.spawn(async move {
            let _permit = match &gate {
                Some(semaphore) => semaphore.acquire().await.ok(),
                None => None,
            };
            let result = tokio::task::spawn_blocking(move || toolchain.build(&request))
                .await
                .unwrap_or_else(|e| Err(BuildError(format!("build task failed: {e}"))));
            (idx, result)
        });
    }

    let mut failed = 0usize;
    while let Some(joined) = set.join_next().await {
        let Ok((idx, result)) = joined else {
            failed += 1;
            continue;
        };
        match result {
            Ok(output) => {
                let ep = &mut records[idx];
                ep.artifact = Some(output.artifact);
                ep.input_files = output.input_files;
            }
            Err(e) => {
                crate::log!("build"; "{} failed: {}", records[idx].key, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("Failed to build the Lambda handlers");
    }
    Ok(())
}
