// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The parent-process orchestrator (§4.4): spawns the configured worker
//! pools, watches their Health rows and exit events, applies the restart
//! policy, and owns pause/resume and graceful shutdown.

use crate::config::SupervisorConfig;
use crate::process::{worker_args, ProcessLauncher, WorkerExit};
use crate::restart::{RestartDecision, RestartTracker};
use nomarr_core::{kv, Clock, ComponentId, ExitCode, HealthRecord, HealthStatus, QueueType, RestartPolicyRow};
use nomarr_queue::Queue;
use nomarr_storage::{HealthFilter, Storage};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::SupervisorError;

/// Channel depth for worker exit reports; generous relative to any
/// realistic pool size since each send is immediately drained by `run`.
const EXIT_CHANNEL_CAPACITY: usize = 256;

pub struct Supervisor<S, C, L> {
    storage: Arc<S>,
    clock: C,
    config: SupervisorConfig,
    launcher: Arc<L>,
    tracker: RestartTracker,
    queue: Queue<S, C>,
    /// Components with a respawn already scheduled, so the monitor tick and
    /// the exit channel never double-schedule the same restart.
    restarting: Mutex<HashSet<ComponentId>>,
    /// `component -> pid` for workers currently believed to be running,
    /// consulted by `shutdown` to know who to signal.
    handles: Mutex<HashMap<ComponentId, u32>>,
    exit_tx: mpsc::Sender<WorkerExit>,
    cancel: CancellationToken,
}

impl<S, C, L> Supervisor<S, C, L>
where
    S: Storage + 'static,
    C: Clock,
    L: ProcessLauncher,
{
    pub fn new(storage: Arc<S>, clock: C, config: SupervisorConfig, launcher: Arc<L>, cancel: CancellationToken) -> (Arc<Self>, mpsc::Receiver<WorkerExit>) {
        let (exit_tx, exit_rx) = mpsc::channel(EXIT_CHANNEL_CAPACITY);
        let tracker = RestartTracker::new(config.backoff_schedule_ms.clone(), config.rapid_window_ms, config.rapid_threshold);
        let queue = Queue::new(storage.clone(), clock.clone());
        let supervisor = Arc::new(Self {
            storage,
            clock,
            config,
            launcher,
            tracker,
            queue,
            restarting: Mutex::new(HashSet::new()),
            handles: Mutex::new(HashMap::new()),
            exit_tx,
            cancel,
        });
        (supervisor, exit_rx)
    }

    /// §4.4 Startup steps 1-2: truncate the ephemeral tables, then bring up
    /// every configured worker slot with a fresh `starting` Health row.
    pub async fn startup(&self) -> Result<(), SupervisorError> {
        for record in self.storage.scan_health(&HealthFilter::default()) {
            self.storage.delete_health(record.component.as_str());
        }
        self.storage.truncate_ephemeral_kv();

        for (queue_type, worker_id) in self.config.slots() {
            self.spawn_worker(&queue_type, worker_id, 0).await?;
        }
        self.heartbeat_app();
        info!(slots = self.config.slots().len(), "supervisor startup complete");
        Ok(())
    }

    /// Runs the select loop until `cancel` fires, then performs shutdown.
    /// The daemon binary is expected to call this once after `startup`.
    pub async fn run(self: Arc<Self>, mut exit_rx: mpsc::Receiver<WorkerExit>) {
        let mut monitor = tokio::time::interval(Duration::from_millis(self.config.monitor_interval_ms));
        let mut app_heartbeat = tokio::time::interval(Duration::from_millis(self.config.worker_heartbeat_interval_ms));

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                Some(exit) = exit_rx.recv() => {
                    self.on_worker_exit(exit).await;
                }
                _ = monitor.tick() => {
                    self.monitor_tick().await;
                }
                _ = app_heartbeat.tick() => {
                    self.heartbeat_app();
                }
            }
        }

        self.shutdown().await;
    }

    /// Spawns the worker for `(queue_type, worker_id)`, publishing its
    /// `starting` Health row (§4.4 step 2). `restart_count` is threaded
    /// through so the respawned process reports the count it's already on.
    async fn spawn_worker(&self, queue_type: &QueueType, worker_id: u32, restart_count: u32) -> Result<(), SupervisorError> {
        let component = ComponentId::worker(queue_type, worker_id);
        let args = worker_args(
            queue_type.as_str(),
            worker_id,
            &self.config.state_dir,
            self.config.worker_poll_interval_ms,
            self.config.worker_heartbeat_interval_ms,
            restart_count,
        );

        let pid = self.launcher.spawn(component.clone(), args, self.exit_tx.clone()).await?;

        self.storage.upsert_health(HealthRecord::starting(component.clone(), pid, self.clock.epoch_ms(), restart_count));
        self.handles.lock().insert(component.clone(), pid);
        self.restarting.lock().remove(&component);
        info!(component = %component, pid, restart_count, "worker spawned");
        Ok(())
    }

    /// Reacts to a worker's process exit reported by its reaper task.
    pub async fn on_worker_exit(self: &Arc<Self>, exit: WorkerExit) {
        self.handles.lock().remove(&exit.component);
        self.apply_restart_policy(exit.component, exit.exit_code).await;
    }

    /// §4.4 monitor tick: reclaim stuck jobs, then treat any non-terminal
    /// worker whose heartbeat has gone stale as dead (true OS-level death is
    /// instead caught by the reaper/exit-channel path, so this only needs
    /// to cover the hung-but-still-alive case).
    pub async fn monitor_tick(self: &Arc<Self>) {
        let reclaimed = self.queue.reset_stuck(self.config.heartbeat_stale_ms);
        if reclaimed > 0 {
            info!(reclaimed, "monitor tick reclaimed stuck jobs");
        }

        let now = self.clock.epoch_ms();
        for record in self.storage.scan_health(&HealthFilter::default()) {
            if record.component.is_app() {
                continue;
            }
            if matches!(record.status, HealthStatus::Failed | HealthStatus::Stopped) {
                continue;
            }
            if !record.is_stale(now, self.config.heartbeat_stale_ms) {
                continue;
            }
            if self.restarting.lock().contains(&record.component) {
                continue;
            }

            warn!(component = %record.component, "worker heartbeat stale, treating as dead");
            self.handles.lock().remove(&record.component);
            self.apply_restart_policy(record.component.clone(), None).await;
        }
    }

    /// §4.4 restart policy steps 1-5, applied to the component's persisted
    /// counters, followed by either scheduling a delayed respawn or marking
    /// the Health row `failed`.
    async fn apply_restart_policy(self: &Arc<Self>, component: ComponentId, exit_code: Option<ExitCode>) {
        let now = self.clock.epoch_ms();

        // A death observed after shutdown has begun is an orderly stop, not
        // a restart candidate.
        if self.cancel.is_cancelled() {
            self.storage.update_health_if(component.as_str(), &|_| true, &|h| {
                h.status = HealthStatus::Stopped;
                h.exit_code = exit_code;
            });
            return;
        }

        let mut row = self.storage.get_restart_policy(component.as_str()).unwrap_or_else(|| RestartPolicyRow::fresh(component.as_str(), now));
        let decision = self.tracker.decide_with_exit(&mut row, now, exit_code);
        self.storage.upsert_restart_policy(row.clone());

        match decision {
            RestartDecision::Restart { after_ms } => {
                self.restarting.lock().insert(component.clone());
                self.storage.update_health_if(component.as_str(), &|_| true, &|h| {
                    h.status = HealthStatus::Crashed;
                    h.exit_code = exit_code;
                    h.restart_count = row.lifetime_restart_count;
                    h.last_restart = Some(now);
                });

                let Some((queue_type, worker_id)) = component.parse_worker() else {
                    warn!(component = %component, "restart decision for non-worker component, ignoring");
                    return;
                };

                let supervisor = Arc::clone(self);
                let restart_count = row.lifetime_restart_count;
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(after_ms)).await;
                    if supervisor.cancel.is_cancelled() {
                        return;
                    }
                    if let Err(err) = supervisor.spawn_worker(&queue_type, worker_id, restart_count).await {
                        warn!(component = %component, error = %err, "respawn failed");
                    }
                });
            }
            RestartDecision::Lockout => {
                self.restarting.lock().remove(&component);
                let reason = if exit_code.is_some_and(ExitCode::is_terminal_for_restart) {
                    "fatal exit code".to_string()
                } else {
                    format!("rapid-failure threshold reached ({} restarts in window)", row.restart_count)
                };
                warn!(component = %component, reason = %reason, "worker locked out, not restarting");
                self.storage.update_health_if(component.as_str(), &|_| true, &|h| {
                    h.status = HealthStatus::Failed;
                    h.exit_code = exit_code;
                    h.metadata = Some(reason.clone());
                });
            }
        }
    }

    /// §4.4 Pause/Resume: a single durable `worker_kv["control:paused"]` flag.
    pub fn pause(&self) -> bool {
        let was_paused = self.is_paused();
        self.storage.set_kv(kv::control_paused().to_string(), "true".to_string());
        was_paused
    }

    pub fn resume(&self) -> bool {
        let was_paused = self.is_paused();
        self.storage.set_kv(kv::control_paused().to_string(), "false".to_string());
        was_paused
    }

    pub fn is_paused(&self) -> bool {
        self.storage.get_kv(kv::control_paused()).as_deref() == Some("true")
    }

    /// Clears a `failed` lockout and immediately respawns the component
    /// (§4.4 Admin operations). Returns `false` if the component wasn't
    /// locked out.
    pub async fn reset_restart_count(self: &Arc<Self>, component: &str) -> Result<bool, SupervisorError> {
        let was_locked = self.storage.get_health(component).map(|h| h.status == HealthStatus::Failed).unwrap_or(false);
        if !was_locked {
            return Ok(false);
        }

        self.storage.upsert_restart_policy(RestartPolicyRow::fresh(component, self.clock.epoch_ms()));

        let component_id = ComponentId::from(component);
        if let Some((queue_type, worker_id)) = component_id.parse_worker() {
            self.spawn_worker(&queue_type, worker_id, 0).await?;
        }
        Ok(true)
    }

    /// §4.4 Shutdown: flag it, signal every running worker, escalate to
    /// `SIGKILL` after the grace period, then mark everything `stopped` and
    /// truncate the ephemeral tables.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.storage.set_kv(kv::control_shutdown().to_string(), "true".to_string());

        let handles: Vec<(ComponentId, u32)> = self.handles.lock().iter().map(|(c, p)| (c.clone(), *p)).collect();
        for (component, pid) in &handles {
            if let Err(err) = self.launcher.terminate(*pid, false).await {
                warn!(component = %component, error = %err, "failed to send stop signal");
            }
        }

        tokio::time::sleep(Duration::from_millis(self.config.shutdown_grace_ms)).await;

        for (component, pid) in &handles {
            if self.handles.lock().contains_key(component) {
                warn!(component = %component, "worker did not exit within grace period, forcing termination");
                let _ = self.launcher.terminate(*pid, true).await;
            }
        }

        for (component, _) in &handles {
            self.storage.update_health_if(component.as_str(), &|_| true, &|h| h.status = HealthStatus::Stopped);
        }
        self.storage.update_health_if("app", &|_| true, &|h| h.status = HealthStatus::Stopped);

        for record in self.storage.scan_health(&HealthFilter::default()) {
            self.storage.delete_health(record.component.as_str());
        }
        self.storage.truncate_ephemeral_kv();
        self.handles.lock().clear();
        info!("supervisor shutdown complete");
    }

    fn heartbeat_app(&self) {
        let now = self.clock.epoch_ms();
        let updated = self.storage.update_health_if("app", &|_| true, &|h| {
            h.last_heartbeat = now;
            h.status = HealthStatus::Healthy;
        });
        if !updated {
            self.storage.upsert_health(HealthRecord::starting(ComponentId::app(), std::process::id(), now, 0));
        }
    }
}
