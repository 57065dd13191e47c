//! The `watch` command: wire up the orchestrator and drive it from the
//! terminal until Ctrl+C.
//!
//! Input handling:
//! - ENTER approves a pending infrastructure deploy
//! - `s` + ENTER prints a state snapshot as JSON

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::io::AsyncBufReadExt;

use crate::build::ProcessToolchain;
use crate::config::AppConfig;
use crate::watcher::DevWatcher;

use super::host::CommandInfraHost;

pub fn run(config: Arc<AppConfig>) -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(run_loop(config))
}

async fn run_loop(config: Arc<AppConfig>) -> Result<()> {
    let toolchain = Arc::new(ProcessToolchain);
    let host = Arc::new(CommandInfraHost::new(Arc::clone(&config)));

    let handle = DevWatcher::new(config, toolchain, host).start(false).await?;

    // Ctrl+C → stop the orchestrator, then unblock the input loop.
    let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
    let (shutdown_tx, shutdown_rx) = crossbeam::channel::bounded(1);
    crate::core::register_shutdown_channel(shutdown_tx);
    {
        let handle = handle.clone();
        tokio::spawn(async move {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    crate::log!("watch"; "shutting down...");
                    handle.stop().await;
                    let _ = stop_tx.send(true);
                    break;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        });
    }

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim() == "s" => {
                    if let Ok(state) = handle.state().await
                        && let Ok(json) = serde_json::to_string_pretty(&state)
                    {
                        println!("{json}");
                    }
                }
                Ok(Some(_)) => handle.input().await,
                Ok(None) | Err(_) => {
                    // stdin closed; stay alive until Ctrl+C.
                    let _ = stop_rx.changed().await;
                    break;
                }
            }
        }
    }

    // Give killed checker children a moment to report exit.
    tokio::time::sleep(Duration::from_millis(200)).await;
    Ok(())
}
