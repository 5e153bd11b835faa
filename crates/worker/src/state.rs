// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker's state-machine core (§4.3 main loop), split out from
//! [`crate::run`]'s tokio driver so it can be unit-tested against a
//! [`FakeClock`] and [`nomarr_storage::MemStorage`] with no async runtime.
//!
//! The split happens around the one genuinely async, arbitrary-duration
//! call in the loop: `process_fn`. [`tick_claim`] does everything up to
//! invoking it; [`apply_outcome`] does everything after, given its result.

use nomarr_adapters::AdapterError;
use nomarr_core::{kv, CalibrationRecord, Clock, ComponentId, HealthStatus, Job, JobId, QueueType};
use nomarr_queue::Queue;
use nomarr_storage::{load_calibration, save_calibration, Storage};

/// What the main loop should do after [`tick_claim`].
pub enum ClaimOutcome {
    /// No pending job; the driver should heartbeat and sleep.
    Idle,
    /// A job was claimed; the driver should now call `process_fn` on it and
    /// feed the result to [`apply_outcome`].
    Claimed(Job),
}

/// What the main loop should do after [`apply_outcome`].
pub enum LoopOutcome {
    /// Keep looping.
    Continue,
    /// `process_fn` returned a fatal/unrecoverable error (§4.3 step (f)):
    /// the worker must set its own health to `failed` and exit with this
    /// code. The health write already happened inside `apply_outcome`.
    Fatal(nomarr_core::ExitCode),
}

/// Step (b)/(c) of the main loop: unless paused, claim the next pending job
/// and publish the job-claimed KV/health state (§4.3).
pub fn tick_claim<S, C>(queue: &Queue<S, C>, storage: &S, component: &ComponentId, queue_type: &QueueType, worker_id: u32, paused: bool) -> ClaimOutcome
where
    S: Storage,
    C: Clock,
{
    if paused {
        return ClaimOutcome::Idle;
    }
    let Some(job) = queue.claim_next(component) else {
        return ClaimOutcome::Idle;
    };

    storage.set_kv(kv::worker_current_job(queue_type, worker_id), job.id.to_string());
    storage.set_kv(kv::job_status(job.id), "running".to_string());
    storage.set_kv(kv::job_path(job.id), job.path.clone());
    storage.update_health_if(component.as_str(), &|_| true, &|h| h.current_job = Some(job.id));

    ClaimOutcome::Claimed(job)
}

/// Steps (d)/(e)/(f): apply `process_fn`'s result to the job, the
/// calibration gate, and (on a fatal error) this worker's own health row.
pub fn apply_outcome<S, C>(
    queue: &Queue<S, C>,
    storage: &S,
    clock: &C,
    component: &ComponentId,
    queue_type: &QueueType,
    job_id: JobId,
    outcome: Result<serde_json::Value, AdapterError>,
    calibration_required_samples: u32,
) -> LoopOutcome
where
    S: Storage,
    C: Clock,
{
    match outcome {
        Ok(result) => {
            let mut calibration = load_calibration(storage, queue_type, calibration_required_samples);
            let gated = !calibration.state.allows_persist();
            calibration.record_sample(clock.epoch_ms());
            save_calibration(storage, queue_type, &calibration);

            queue.mark_done(job_id, Some(result));
            storage.set_kv(kv::job_status(job_id), "done".to_string());
            if gated {
                storage.set_kv(kv::job_calibration_gated(job_id), "true".to_string());
            }
            LoopOutcome::Continue
        }
        Err(AdapterError::Recoverable(message)) => {
            queue.mark_error(job_id, message);
            storage.set_kv(kv::job_status(job_id), "error".to_string());
            LoopOutcome::Continue
        }
        Err(fatal) => {
            let exit_code = fatal.worker_exit_code().unwrap_or(nomarr_core::ExitCode::Unrecoverable);
            // A fatal error still leaves the job itself in limbo (neither
            // done nor error); the supervisor's `reset_stuck` reclaims it
            // once this worker's health goes stale, same as a crash.
            storage.update_health_if(component.as_str(), &|_| true, &|h| {
                h.status = HealthStatus::Failed;
                h.exit_code = Some(exit_code);
            });
            LoopOutcome::Fatal(exit_code)
        }
    }
}

/// Whether the supervisor's pause flag is currently set (§4.6).
pub fn is_paused<S: Storage>(storage: &S) -> bool {
    storage.get_kv(kv::control_paused()).as_deref() == Some("true")
}

/// Whether a shutdown has been requested (§4.4 Shutdown step 1).
pub fn is_shutdown_requested<S: Storage>(storage: &S) -> bool {
    storage.get_kv(kv::control_shutdown()).as_deref() == Some("true")
}

/// Unconditionally republishes this component's heartbeat, preserving the
/// fields only the supervisor mutates (`restart_count`, `last_restart`).
pub fn heartbeat<S: Storage, C: Clock>(storage: &S, clock: &C, component: &ComponentId, status: HealthStatus, pid: u32) {
    let now = clock.epoch_ms();
    let updated = storage.update_health_if(component.as_str(), &|_| true, &|h| {
        h.last_heartbeat = now;
        h.status = status;
    });
    if !updated {
        storage.upsert_health(nomarr_core::HealthRecord::starting(component.clone(), pid, now, 0));
    }
}
