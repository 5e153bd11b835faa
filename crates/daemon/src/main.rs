// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `nmr-daemon`: the parent process that wires up the Job Queue's
//! supporting cast — Worker Supervisor (§4.4), State Broker (§4.5), and
//! Control Plane (§4.6) — and owns the OS-level concerns none of those
//! crates take on themselves: config loading, logging, and signal handling.
//! Grounded on the teacher's `ojd` binary, which plays the same role for
//! `oj-core`/`oj-runbook`.

mod signal;

use std::sync::Arc;

use nomarr_control::ControlPlane;
use nomarr_core::SystemClock;
use nomarr_daemon::{DaemonError, InstanceLock, NomarrConfig};
use nomarr_storage::FileStorage;
use nomarr_supervisor::{CommandLauncher, Supervisor, SupervisorConfig};
use nomarr_broker::Broker;
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> std::process::ExitCode {
    if let Some(arg) = std::env::args().nth(1) {
        return match arg.as_str() {
            "--version" | "-V" => {
                println!("nmr-daemon {}", env!("CARGO_PKG_VERSION"));
                std::process::ExitCode::SUCCESS
            }
            "--help" | "-h" => {
                print_help();
                std::process::ExitCode::SUCCESS
            }
            other => {
                eprintln!("error: unexpected argument '{other}'");
                eprintln!("usage: nmr-daemon [--help | --version]");
                std::process::ExitCode::FAILURE
            }
        };
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("nmr-daemon: failed to start async runtime: {err}");
            return std::process::ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run()) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("nmr-daemon: {err}");
            std::process::ExitCode::FAILURE
        }
    }
}

fn print_help() {
    println!("nmr-daemon {}", env!("CARGO_PKG_VERSION"));
    println!("Nomarr's worker-orchestration daemon: supervises tagging workers,");
    println!("polls their state onto the state broker, and owns the control plane.");
    println!();
    println!("Configuration is read from $NOMARR_CONFIG_PATH (or the platform config");
    println!("directory) and overridden by NOMARR_* environment variables.");
}

async fn run() -> Result<(), DaemonError> {
    let config = NomarrConfig::load()?;
    let state_dir = config.resolved_state_dir()?;
    std::fs::create_dir_all(&state_dir).map_err(|source| DaemonError::ConfigRead { path: state_dir.display().to_string(), source })?;

    let _log_guard = init_logging(&state_dir)?;
    tracing::info!(state_dir = %state_dir.display(), "starting nomarr-daemon");

    // Held for the rest of `run`'s lifetime: a second daemon pointed at the
    // same state dir would otherwise race this one's WAL writes.
    let _instance_lock = InstanceLock::acquire(&state_dir)?;

    let storage = Arc::new(FileStorage::open(&state_dir)?);
    let clock = SystemClock;
    let cancel = CancellationToken::new();

    let mut supervisor_config = SupervisorConfig::new(config.resolved_worker_binary_path(), state_dir.display().to_string());
    supervisor_config.pools = config.worker_counts.clone();
    supervisor_config.heartbeat_stale_ms = config.heartbeat_stale_ms;
    supervisor_config.monitor_interval_ms = config.monitor_interval_ms;
    supervisor_config.backoff_schedule_ms = config.backoff_schedule_ms.clone();
    supervisor_config.rapid_window_ms = config.rapid_window_ms;
    supervisor_config.rapid_threshold = config.rapid_threshold;
    supervisor_config.shutdown_grace_ms = config.shutdown_grace_ms;
    supervisor_config.worker_poll_interval_ms = config.worker_poll_interval_ms;
    supervisor_config.worker_heartbeat_interval_ms = config.worker_heartbeat_ms;

    let launcher = Arc::new(CommandLauncher::new(config.resolved_worker_binary_path()));
    let (supervisor, exit_rx) = Supervisor::new(storage.clone(), clock.clone(), supervisor_config, launcher, cancel.clone());
    supervisor.startup().await?;

    let broker = Broker::new(storage.clone(), clock.clone(), config.broker_tick_ms);
    let control = Arc::new(ControlPlane::new(storage.clone(), clock.clone(), Arc::clone(&supervisor), Arc::clone(&broker), config.calibration_required_samples));

    signal::spawn_shutdown_handler(cancel.clone())?;

    let broker_task = tokio::spawn(Arc::clone(&broker).run(cancel.clone()));
    let retention_task = spawn_retention_cleanup(control, config.retention_age_ms, cancel.clone());

    // `run` owns shutdown: it watches `cancel`, then signals every worker,
    // waits out the grace period, and truncates the ephemeral tables.
    supervisor.run(exit_rx).await;

    cancel.cancel();
    let _ = broker_task.await;
    let _ = retention_task.await;

    tracing::info!("nomarr-daemon stopped");
    Ok(())
}

/// Periodic `retention_cleanup` sweep (SPEC_FULL.md §4.6 Expansion: the
/// daemon, not an external cron, owns pruning terminal jobs older than
/// `retention_age_ms`). Runs on the same cadence as the supervisor's
/// monitor tick since both are "occasional background sweep" work.
fn spawn_retention_cleanup<S, C, L>(control: Arc<ControlPlane<S, C, L>>, age_ms: u64, cancel: CancellationToken) -> tokio::task::JoinHandle<()>
where
    S: nomarr_storage::Storage + 'static,
    C: nomarr_core::Clock,
    L: nomarr_supervisor::ProcessLauncher,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(age_ms.min(3_600_000).max(60_000)));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let pruned = control.retention_cleanup(age_ms);
                    if pruned > 0 {
                        tracing::info!(pruned, "retention cleanup pruned terminal jobs");
                    }
                }
            }
        }
    })
}

/// Installs a non-blocking file appender under `<state_dir>/logs/` and
/// returns the guard that must be held for the subscriber to keep flushing
/// (teacher pattern: `oj-daemon` holds the equivalent guard in `main`'s
/// local scope for the same reason).
fn init_logging(state_dir: &std::path::Path) -> Result<WorkerGuard, DaemonError> {
    let log_dir = state_dir.join("logs");
    std::fs::create_dir_all(&log_dir).map_err(|source| DaemonError::ConfigRead { path: log_dir.display().to_string(), source })?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "nomarr-daemon.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(fmt::layer().with_writer(non_blocking).with_ansi(false)).init();

    Ok(guard)
}
