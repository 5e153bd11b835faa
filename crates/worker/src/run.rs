// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The async driver around [`crate::state`]'s pure core: owns the tokio
//! runtime concerns the state machine itself doesn't — a dedicated
//! heartbeat task (SPEC_FULL.md §4.3's chosen option (a), so `process_fn`
//! never starves the heartbeat), `poll_interval` sleeps, and cooperative
//! shutdown via a [`CancellationToken`].

use crate::config::WorkerConfig;
use crate::state::{apply_outcome, heartbeat, is_paused, is_shutdown_requested, tick_claim, ClaimOutcome, LoopOutcome};
use nomarr_adapters::TaggingAdapter;
use nomarr_core::{Clock, ComponentId, ExitCode, HealthStatus};
use nomarr_queue::Queue;
use nomarr_storage::Storage;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Runs a worker process to completion: the main claim/process/complete
/// loop plus a sibling heartbeat task, until `cancel` fires, a shutdown KV
/// flag is observed, or `process_fn` returns a fatal error (§4.3).
///
/// Returns the exit code the OS process should use (§6).
pub async fn run<S, C, A>(
    config: WorkerConfig,
    storage: Arc<S>,
    clock: C,
    adapter: Arc<A>,
    pid: u32,
    cancel: CancellationToken,
) -> ExitCode
where
    S: Storage + 'static,
    C: Clock,
    A: TaggingAdapter,
{
    let component = ComponentId::worker(&config.queue_type, config.worker_id);
    let queue = Queue::new(storage.clone(), clock.clone());

    storage.upsert_health(nomarr_core::HealthRecord::starting(component.clone(), pid, clock.epoch_ms(), config.restart_count));
    heartbeat(storage.as_ref(), &clock, &component, HealthStatus::Healthy, pid);

    let heartbeat_task = {
        let storage = storage.clone();
        let clock = clock.clone();
        let component = component.clone();
        let cancel = cancel.clone();
        let interval = Duration::from_millis(config.heartbeat_interval_ms);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep(interval) => {
                        heartbeat(storage.as_ref(), &clock, &component, HealthStatus::Healthy, pid);
                    }
                }
            }
        })
    };

    let exit_code = main_loop(&config, storage.as_ref(), &clock, &queue, adapter.as_ref(), &component, &cancel).await;

    cancel.cancel();
    let _ = heartbeat_task.await;

    // A fatal `process_fn` error already left the health row in `failed`
    // with its own exit code (§4.3 step (f)); only a cooperative shutdown
    // goes through the `stopping -> stopped` transition of step 4.
    if exit_code == ExitCode::Ok {
        heartbeat(storage.as_ref(), &clock, &component, HealthStatus::Stopping, pid);
        storage.update_health_if(component.as_str(), &|_| true, &|h| {
            h.status = HealthStatus::Stopped;
            h.exit_code = Some(exit_code);
        });
    }
    info!(component = %component, ?exit_code, "worker stopped");
    exit_code
}

async fn main_loop<S, C, A>(
    config: &WorkerConfig,
    storage: &S,
    clock: &C,
    queue: &Queue<S, C>,
    adapter: &A,
    component: &ComponentId,
    cancel: &CancellationToken,
) -> ExitCode
where
    S: Storage,
    C: Clock,
    A: TaggingAdapter,
{
    let poll_interval = Duration::from_millis(config.poll_interval_ms);

    loop {
        if cancel.is_cancelled() || is_shutdown_requested(storage) {
            return ExitCode::Ok;
        }

        let paused = is_paused(storage);
        let outcome = tick_claim(queue, storage, component, &config.queue_type, config.worker_id, paused);

        let job = match outcome {
            ClaimOutcome::Idle => {
                tokio::select! {
                    _ = cancel.cancelled() => return ExitCode::Ok,
                    _ = sleep(poll_interval) => {}
                }
                continue;
            }
            ClaimOutcome::Claimed(job) => job,
        };

        let result = adapter.process(&job.path, job.force).await;
        if let Err(err) = &result {
            warn!(job_id = %job.id, error = %err, "process_fn failed");
        }
        match apply_outcome(queue, storage, clock, component, &config.queue_type, job.id, result, config.calibration_required_samples) {
            LoopOutcome::Continue => continue,
            LoopOutcome::Fatal(code) => return code,
        }
    }
}
