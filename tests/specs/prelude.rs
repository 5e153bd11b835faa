// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for the end-to-end scenarios in spec.md §8. Wires the
//! same components `nomarr-daemon`'s `main.rs` does — `Queue`, `Supervisor`,
//! `Broker`, `ControlPlane` — over `MemStorage`/`FakeClock` instead of
//! `FileStorage`/`SystemClock`, with worker processes run in-task instead of
//! forked, so every scenario advances deterministically under
//! `tokio::time::pause`.

#![allow(dead_code)]

use async_trait::async_trait;
use nomarr_adapters::TaggingAdapter;
use nomarr_broker::Broker;
use nomarr_control::ControlPlane;
use nomarr_core::{ComponentId, ExitCode, FakeClock};
use nomarr_supervisor::{ProcessLauncher, Supervisor, SupervisorConfig, WorkerExit};
use nomarr_worker::WorkerConfig;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Default tuning used across scenarios: fast enough that a handful of
/// `advance()` calls exercises real polling/heartbeat/monitor cadences
/// without every test hand-tuning its own intervals.
pub const POLL_INTERVAL_MS: u64 = 50;
pub const HEARTBEAT_INTERVAL_MS: u64 = 100;
pub const HEARTBEAT_STALE_MS: u64 = 300;
pub const MONITOR_INTERVAL_MS: u64 = 100;
pub const BROKER_TICK_MS: u64 = 25;
pub const SHUTDOWN_GRACE_MS: u64 = 50;

struct RunningTask {
    component: ComponentId,
    cancel: CancellationToken,
    abort: tokio::task::AbortHandle,
    exit_tx: mpsc::Sender<WorkerExit>,
}

/// A [`ProcessLauncher`] that runs [`nomarr_worker::run`] as an in-process
/// tokio task instead of forking `nmr-worker`, so scenario tests can drive
/// it under a paused, fake-clock runtime. Grounded on the same seam
/// `nomarr_supervisor::test_support::FakeLauncher` uses, but unlike that
/// scripted double, this one runs the *real* worker loop against the
/// harness's shared storage and adapter.
pub struct TaskLauncher<S, C, A> {
    storage: Arc<S>,
    clock: C,
    adapter: Arc<A>,
    poll_interval_ms: u64,
    heartbeat_interval_ms: u64,
    next_pid: Mutex<u32>,
    tasks: Arc<Mutex<HashMap<u32, RunningTask>>>,
}

impl<S, C, A> TaskLauncher<S, C, A>
where
    S: nomarr_storage::Storage + 'static,
    C: nomarr_core::Clock,
    A: TaggingAdapter,
{
    pub fn new(storage: Arc<S>, clock: C, adapter: Arc<A>, poll_interval_ms: u64, heartbeat_interval_ms: u64) -> Self {
        Self { storage, clock, adapter, poll_interval_ms, heartbeat_interval_ms, next_pid: Mutex::new(1), tasks: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Test-only: simulates an unexpected OS-level death (a `SIGKILL` from
    /// outside the process, or a segfault) rather than the cooperative
    /// `terminate` path — aborts the task immediately and reports it on the
    /// exit channel with no exit code, exactly what `CommandLauncher`'s
    /// reaper reports when a real process disappears without an exit
    /// status. Returns `false` if `component` isn't currently running.
    pub async fn kill_component(&self, component: &str) -> bool {
        let task = {
            let mut tasks = self.tasks.lock();
            let pid = tasks.iter().find(|(_, t)| t.component.as_str() == component).map(|(pid, _)| *pid);
            pid.and_then(|pid| tasks.remove(&pid))
        };
        let Some(task) = task else { return false };
        // A real `SIGKILL` takes every thread in the process down at once —
        // cancel first so the worker's separately-spawned heartbeat task
        // (which `abort` alone would otherwise orphan, still running) stops
        // too, then abort the main loop before it can run its own
        // cooperative shutdown.
        task.cancel.cancel();
        task.abort.abort();
        let _ = task.exit_tx.send(WorkerExit { component: task.component, exit_code: None, raw_status: None }).await;
        true
    }

    pub fn is_running(&self, component: &str) -> bool {
        self.tasks.lock().values().any(|t| t.component.as_str() == component)
    }
}

fn parse_u32_flag(args: &[String], flag: &str) -> Option<u32> {
    args.iter().position(|a| a == flag).and_then(|i| args.get(i + 1)).and_then(|v| v.parse().ok())
}

#[async_trait]
impl<S, C, A> ProcessLauncher for TaskLauncher<S, C, A>
where
    S: nomarr_storage::Storage + 'static,
    C: nomarr_core::Clock,
    A: TaggingAdapter,
{
    async fn spawn(&self, component: ComponentId, args: Vec<String>, exit_tx: mpsc::Sender<WorkerExit>) -> Result<u32, io::Error> {
        let (queue_type, worker_id) = component.parse_worker().ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("{component} is not a worker component")))?;
        let restart_count = parse_u32_flag(&args, "--restart-count").unwrap_or(0);

        let pid = {
            let mut next = self.next_pid.lock();
            let pid = *next;
            *next += 1;
            pid
        };

        let mut config = WorkerConfig::new(component.as_str().to_string(), queue_type, worker_id);
        config.poll_interval_ms = self.poll_interval_ms;
        config.heartbeat_interval_ms = self.heartbeat_interval_ms;
        config.restart_count = restart_count;

        let cancel = CancellationToken::new();
        let join = tokio::spawn(nomarr_worker::run(config, self.storage.clone(), self.clock.clone(), self.adapter.clone(), pid, cancel.clone()));
        let abort = join.abort_handle();

        self.tasks.lock().insert(pid, RunningTask { component: component.clone(), cancel, abort, exit_tx: exit_tx.clone() });

        let tasks = self.tasks.clone();
        tokio::spawn(async move {
            let result = join.await;
            tasks.lock().remove(&pid);
            if let Ok(exit_code) = result {
                if exit_code != ExitCode::Ok {
                    let _ = exit_tx.send(WorkerExit { component, exit_code: Some(exit_code), raw_status: Some(exit_code.as_code()) }).await;
                }
            }
        });

        Ok(pid)
    }

    async fn terminate(&self, pid: u32, force: bool) -> Result<(), io::Error> {
        let cancel = self.tasks.lock().get(&pid).map(|t| t.cancel.clone());
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        if force {
            if let Some(task) = self.tasks.lock().remove(&pid) {
                task.abort.abort();
            }
        }
        Ok(())
    }
}

pub type Storage = nomarr_storage::MemStorage;
pub type Clock = FakeClock;

/// Every wired-up component for one scenario, assembled the way
/// `nomarr-daemon::main` assembles them in production.
pub struct Harness<A: TaggingAdapter> {
    pub storage: Arc<Storage>,
    pub clock: Clock,
    pub launcher: Arc<TaskLauncher<Storage, Clock, A>>,
    pub supervisor: Arc<Supervisor<Storage, Clock, TaskLauncher<Storage, Clock, A>>>,
    pub broker: Arc<Broker<Storage, Clock>>,
    pub control: Arc<ControlPlane<Storage, Clock, TaskLauncher<Storage, Clock, A>>>,
    pub cancel: CancellationToken,
    supervisor_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    broker_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl<A: TaggingAdapter> Harness<A> {
    /// Builds and starts a harness with one worker pool per `(queue_type,
    /// count)` pair, then spawns the supervisor and broker run loops in the
    /// background exactly as `nomarr-daemon` does after `startup()`.
    pub async fn start(pools: &[(&str, u32)], adapter: Arc<A>) -> Self {
        Self::start_with(pools, adapter, |cfg| cfg).await
    }

    /// Same as [`Self::start`], with a callback to tweak the
    /// [`SupervisorConfig`] before `startup()` (rapid-failure thresholds,
    /// backoff schedule, etc.) for scenarios that need non-default tuning.
    pub async fn start_with(pools: &[(&str, u32)], adapter: Arc<A>, customize: impl FnOnce(SupervisorConfig) -> SupervisorConfig) -> Self {
        let storage = Arc::new(Storage::new());
        let clock = Clock::new();
        let launcher = Arc::new(TaskLauncher::new(storage.clone(), clock.clone(), adapter, POLL_INTERVAL_MS, HEARTBEAT_INTERVAL_MS));

        let mut config = SupervisorConfig::new("in-process", "/tmp/nomarr-specs");
        for (queue_type, count) in pools {
            config = config.with_pool(*queue_type, *count);
        }
        config.heartbeat_stale_ms = HEARTBEAT_STALE_MS;
        config.monitor_interval_ms = MONITOR_INTERVAL_MS;
        config.worker_poll_interval_ms = POLL_INTERVAL_MS;
        config.worker_heartbeat_interval_ms = HEARTBEAT_INTERVAL_MS;
        config.shutdown_grace_ms = SHUTDOWN_GRACE_MS;
        let config = customize(config);

        let cancel = CancellationToken::new();
        let (supervisor, exit_rx) = Supervisor::new(storage.clone(), clock.clone(), config, launcher.clone(), cancel.clone());
        supervisor.startup().await.expect("supervisor startup");

        let broker = Broker::new(storage.clone(), clock.clone(), BROKER_TICK_MS);
        let control = Arc::new(ControlPlane::new(storage.clone(), clock.clone(), supervisor.clone(), broker.clone(), 20));

        let supervisor_task = tokio::spawn(supervisor.clone().run(exit_rx));
        let broker_task = tokio::spawn(broker.clone().run(cancel.clone()));

        Self {
            storage,
            clock,
            launcher,
            supervisor,
            broker,
            control,
            cancel,
            supervisor_task: Mutex::new(Some(supervisor_task)),
            broker_task: Mutex::new(Some(broker_task)),
        }
    }

    /// Cancels the supervisor (which drains its own shutdown sequence) and
    /// the broker, then waits for both background tasks to finish. Mirrors
    /// `nomarr-daemon::main`'s shutdown tail.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let supervisor_task = self.supervisor_task.lock().take();
        if let Some(task) = supervisor_task {
            let _ = task.await;
        }
        let broker_task = self.broker_task.lock().take();
        if let Some(task) = broker_task {
            let _ = task.await;
        }
    }
}

/// Advances both the fake clock and the paused tokio runtime by `duration`,
/// then yields repeatedly so every task woken by the advance gets to run —
/// the same pattern used throughout the unit tests in each crate.
pub async fn advance(clock: &Clock, duration: Duration) {
    clock.advance(duration);
    tokio::time::advance(duration).await;
    drain(50).await;
}

pub async fn drain(n: usize) {
    for _ in 0..n {
        tokio::task::yield_now().await;
    }
}
