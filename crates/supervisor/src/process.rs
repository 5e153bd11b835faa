// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker process spawning (§4.4): `Supervisor` never polls a pid to notice
//! death, it pairs every spawn with a reaper task that awaits the child and
//! reports the exit down a channel. Grounded on the teacher's coop-agent
//! spawn path, which spawns a sibling `tokio::spawn` to `wait_with_output`
//! the child and log its exit status rather than polling.

use async_trait::async_trait;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use nomarr_core::{ComponentId, ExitCode};
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{error, warn};

/// Reported by a reaper task once its child exits, fed into the
/// `Supervisor`'s main select loop (§4.4: event-driven, not pid-poll-based).
#[derive(Debug, Clone)]
pub struct WorkerExit {
    pub component: ComponentId,
    pub exit_code: Option<ExitCode>,
    pub raw_status: Option<i32>,
}

/// Spawns worker processes. Abstracted so tests can drive the `Supervisor`
/// without forking real OS processes (mirrors the `Clock`/`Storage`/
/// `TaggingAdapter` trait seams used elsewhere in the workspace).
#[async_trait]
pub trait ProcessLauncher: Send + Sync + 'static {
    /// Spawns the worker for `component` with the given CLI `args` and
    /// returns its pid. The launcher is responsible for arranging a reaper
    /// that sends a [`WorkerExit`] on `exit_tx` once the process dies.
    async fn spawn(
        &self,
        component: ComponentId,
        args: Vec<String>,
        exit_tx: mpsc::Sender<WorkerExit>,
    ) -> Result<u32, std::io::Error>;

    /// Sends `SIGTERM` (`force=false`) or `SIGKILL` (`force=true`) to `pid`
    /// (§4.4 shutdown steps 2-3: stop signal first, then forcibly terminate
    /// stragglers after `shutdown_grace_ms`).
    async fn terminate(&self, pid: u32, force: bool) -> Result<(), std::io::Error>;
}

/// Launches the `nmr-worker` binary as a real OS subprocess.
pub struct CommandLauncher {
    binary_path: String,
}

impl CommandLauncher {
    pub fn new(binary_path: impl Into<String>) -> Self {
        Self { binary_path: binary_path.into() }
    }
}

#[async_trait]
impl ProcessLauncher for CommandLauncher {
    async fn spawn(
        &self,
        component: ComponentId,
        args: Vec<String>,
        exit_tx: mpsc::Sender<WorkerExit>,
    ) -> Result<u32, std::io::Error> {
        let mut command = Command::new(&self.binary_path);
        command.args(&args).stdin(Stdio::null()).stdout(Stdio::inherit()).stderr(Stdio::inherit()).kill_on_drop(true);

        let mut child = command.spawn()?;
        let pid = child.id().unwrap_or_default();

        tokio::spawn(async move {
            let status = child.wait().await;
            let report = match status {
                Ok(status) => {
                    let code = status.code();
                    warn!(component = %component, ?code, "worker process exited");
                    WorkerExit { component, exit_code: code.and_then(ExitCode::from_code), raw_status: code }
                }
                Err(err) => {
                    error!(component = %component, error = %err, "failed to wait on worker process");
                    WorkerExit { component, exit_code: None, raw_status: None }
                }
            };
            let _ = exit_tx.send(report).await;
        });

        Ok(pid)
    }

    async fn terminate(&self, pid: u32, force: bool) -> Result<(), std::io::Error> {
        let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
        kill(Pid::from_raw(pid as i32), signal).map_err(std::io::Error::from)
    }
}

/// Builds the CLI arguments `nmr-worker` expects (§4.4: the supervisor
/// launches one OS process per worker slot, passing its identity and
/// tuning knobs as flags rather than a config file).
pub fn worker_args(
    queue_type: &str,
    worker_id: u32,
    state_dir: &str,
    poll_interval_ms: u64,
    heartbeat_interval_ms: u64,
    restart_count: u32,
) -> Vec<String> {
    vec![
        "--queue-type".to_string(),
        queue_type.to_string(),
        "--worker-id".to_string(),
        worker_id.to_string(),
        "--state-dir".to_string(),
        state_dir.to_string(),
        "--poll-interval-ms".to_string(),
        poll_interval_ms.to_string(),
        "--heartbeat-interval-ms".to_string(),
        heartbeat_interval_ms.to_string(),
        "--restart-count".to_string(),
        restart_count.to_string(),
    ]
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// A [`ProcessLauncher`] that never forks a real process. Each `spawn`
    /// call pops a scripted pid and, if a scripted exit is queued for this
    /// call, immediately reports it on `exit_tx` so tests can drive the
    /// `Supervisor`'s exit-channel path deterministically.
    #[derive(Clone, Default)]
    pub struct FakeLauncher {
        next_pid: Arc<Mutex<u32>>,
        scripted_exits: Arc<Mutex<VecDeque<Option<WorkerExit>>>>,
    }

    impl FakeLauncher {
        pub fn new() -> Self {
            Self { next_pid: Arc::new(Mutex::new(1000)), scripted_exits: Arc::new(Mutex::new(VecDeque::new())) }
        }

        /// Queues an immediate exit report for the next `spawn` call.
        pub fn queue_exit(&self, exit_code: Option<ExitCode>) {
            self.scripted_exits.lock().push_back(Some(WorkerExit { component: ComponentId::app(), exit_code, raw_status: exit_code.map(ExitCode::as_code) }));
        }

        /// The next `spawn` call stays alive (no scripted exit pushed).
        pub fn queue_alive(&self) {
            self.scripted_exits.lock().push_back(None);
        }
    }

    #[async_trait]
    impl ProcessLauncher for FakeLauncher {
        async fn spawn(
            &self,
            component: ComponentId,
            _args: Vec<String>,
            exit_tx: mpsc::Sender<WorkerExit>,
        ) -> Result<u32, std::io::Error> {
            let pid = {
                let mut next = self.next_pid.lock();
                let pid = *next;
                *next += 1;
                pid
            };

            let scripted = self.scripted_exits.lock().pop_front().flatten();
            if let Some(mut exit) = scripted {
                exit.component = component;
                tokio::spawn(async move {
                    let _ = exit_tx.send(exit).await;
                });
            }
            Ok(pid)
        }

        async fn terminate(&self, _pid: u32, _force: bool) -> Result<(), std::io::Error> {
            Ok(())
        }
    }
}
