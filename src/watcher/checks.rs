//! Checker child-process plumbing.
//!
//! Lint and type-check run as child processes inheriting the parent's
//! stdio; their exit codes are not interpreted. Each spawned child gets a
//! cooperative kill trigger; the owning handle is only cleared once the
//! child reports exit (a `CheckerExited` event carrying the handle id).

use std::process::Stdio;

use tokio::sync::{mpsc, oneshot};

use super::messages::{CheckScope, CheckerKind, WatchEvent};

/// Handle to a live checker process.
pub(crate) struct CheckerHandle {
    /// Generation id; exit events for an older generation are ignored.
    pub id: u64,
    kill: Option<oneshot::Sender<()>>,
}

impl CheckerHandle {
    /// Cooperatively kill the child. Idempotent.
    pub fn kill(&mut self) {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
    }
}

/// Spawn a checker child and the task that waits on it.
///
/// Returns `None` when the process cannot be spawned; the failure is
/// logged and does not affect entry-point state.
pub(crate) fn spawn_checker(
    mut cmd: tokio::process::Command,
    scope: CheckScope,
    kind: CheckerKind,
    id: u64,
    tx: mpsc::Sender<WatchEvent>,
) -> Option<CheckerHandle> {
    cmd.stdin(Stdio::null());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            crate::log!("check"; "failed to spawn {}: {}", kind.label(), e);
            return None;
        }
    };

    let (kill_tx, kill_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let finished = tokio::select! {
            status = child.wait() => status.is_ok(),
            _ = kill_rx => false,
        };
        if !finished {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        let _ = tx.send(WatchEvent::CheckerExited { scope, kind, id }).await;
    });

    Some(CheckerHandle {
        id,
        kill: Some(kill_tx),
    })
}

/// Whether colored checker output is wanted (`NO_COLOR` convention).
pub(crate) fn color_enabled() -> bool {
    std::env::var_os("NO_COLOR").is_none_or(|v| v.is_empty())
}

/// Build a command from a configured argv. Returns `None` on an empty argv.
pub(crate) fn command_from_argv(argv: &[String]) -> Option<tokio::process::Command> {
    let (program, args) = argv.split_first()?;
    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args);
    Some(cmd)
}
