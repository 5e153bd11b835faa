// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Control Plane (§4.6): the narrow surface the surrounding application
//! (CLI, HTTP layer) depends on. Thin composition over [`nomarr_queue::Queue`],
//! [`nomarr_supervisor::Supervisor`], and [`nomarr_broker::Broker`] — every
//! operation here is non-blocking and does O(few DB calls), per spec. None of
//! them launch worker processes; spawn stays exclusively the Supervisor's.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod error;

pub use error::ControlError;

use nomarr_broker::{Broker, EventReceiver, SubscriptionHandle};
use nomarr_core::{Clock, JobId, JobStatus, QueueType};
use nomarr_queue::Queue;
use nomarr_storage::{load_calibration, save_calibration, HealthFilter, JobFilter, Storage};
use nomarr_supervisor::{ProcessLauncher, Supervisor};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Window used for the `status()` rate estimate: jobs finished within the
/// last minute, the way an operator dashboard's "jobs/min" figure would read.
const RATE_WINDOW_MS: u64 = 60_000;

/// Liveness summary for one worker, part of [`Snapshot`].
#[derive(Debug, Clone, Serialize)]
pub struct WorkerSnapshot {
    pub component: String,
    pub status: nomarr_core::HealthStatus,
    pub restart_count: u32,
    pub heartbeat_age_ms: u64,
}

/// `status()`'s aggregate view (§4.6): queue counts by status, per-worker
/// health, app heartbeat age, and a rough throughput estimate.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub queue_counts: HashMap<String, usize>,
    pub workers: Vec<WorkerSnapshot>,
    pub app_heartbeat_age_ms: Option<u64>,
    pub completed_last_minute: usize,
}

/// The narrow API the rest of the application uses (§4.6).
pub struct ControlPlane<S, C, L> {
    storage: Arc<S>,
    clock: C,
    queue: Queue<S, C>,
    supervisor: Arc<Supervisor<S, C, L>>,
    broker: Arc<Broker<S, C>>,
    calibration_required_samples: u32,
}

impl<S, C, L> ControlPlane<S, C, L>
where
    S: Storage + 'static,
    C: Clock,
    L: ProcessLauncher,
{
    pub fn new(storage: Arc<S>, clock: C, supervisor: Arc<Supervisor<S, C, L>>, broker: Arc<Broker<S, C>>, calibration_required_samples: u32) -> Self {
        let queue = Queue::new(storage.clone(), clock.clone());
        Self { storage, clock, queue, supervisor, broker, calibration_required_samples }
    }

    /// Inserts a pending job for each path and returns the created ids.
    /// Dedup against already-queued identical paths is the caller's
    /// responsibility (§9 Open Question 2).
    pub fn enqueue(&self, paths: &[String], force: bool) -> Vec<JobId> {
        paths.iter().map(|path| self.queue.enqueue(path.clone(), force)).collect()
    }

    /// Toggles the supervisor's pause flag, returning the previous state.
    pub fn pause(&self) -> bool {
        self.supervisor.pause()
    }

    pub fn resume(&self) -> bool {
        self.supervisor.resume()
    }

    pub fn status(&self) -> Snapshot {
        let (jobs, _) = self.queue.list(&JobFilter::default());
        let mut queue_counts: HashMap<String, usize> = HashMap::new();
        for job in &jobs {
            *queue_counts.entry(job.status.to_string()).or_insert(0) += 1;
        }

        let now = self.clock.epoch_ms();
        let completed_last_minute =
            jobs.iter().filter(|job| matches!(job.status, JobStatus::Done | JobStatus::Error)).filter(|job| job.finished_at.is_some_and(|at| now.saturating_sub(at) <= RATE_WINDOW_MS)).count();

        let mut workers = Vec::new();
        let mut app_heartbeat_age_ms = None;
        for record in self.storage.scan_health(&HealthFilter::default()) {
            if record.component.is_app() {
                app_heartbeat_age_ms = Some(now.saturating_sub(record.last_heartbeat));
                continue;
            }
            workers.push(WorkerSnapshot {
                component: record.component.as_str().to_string(),
                status: record.status,
                restart_count: record.restart_count,
                heartbeat_age_ms: now.saturating_sub(record.last_heartbeat),
            });
        }

        Snapshot { queue_counts, workers, app_heartbeat_age_ms, completed_last_minute }
    }

    /// Registers a subscriber against one or more topic patterns (§4.6,
    /// delegated straight to the Broker).
    pub fn subscribe(&self, patterns: &[String]) -> Result<(SubscriptionHandle, EventReceiver), ControlError> {
        Ok(self.broker.subscribe(patterns)?)
    }

    /// Same as [`Self::subscribe`] with an explicit per-subscription buffer
    /// size, for callers that need a tighter (or looser) backpressure bound
    /// than the broker's configured default.
    pub fn subscribe_with_buffer(&self, patterns: &[String], buffer: usize) -> Result<(SubscriptionHandle, EventReceiver), ControlError> {
        Ok(self.broker.subscribe_with_buffer(patterns, buffer)?)
    }

    pub fn reset_errors(&self) -> usize {
        self.queue.reset_errors()
    }

    pub fn reset_stuck(&self, threshold_ms: u64) -> usize {
        self.queue.reset_stuck(threshold_ms)
    }

    pub fn retention_cleanup(&self, age_ms: u64) -> usize {
        self.queue.retention_cleanup(age_ms)
    }

    /// Clears a `failed` lockout and respawns the component (§4.6, §4.4
    /// admin operations).
    pub async fn reset_restart_count(&self, component: &str) -> Result<bool, ControlError> {
        Ok(self.supervisor.reset_restart_count(component).await?)
    }

    /// `uncalibrated|stale -> calibrating`, resetting `sample_count` to 0
    /// (SPEC_FULL.md §3 Calibration State, §4.6 Expansion).
    pub fn begin_calibration(&self, queue_type: &QueueType) {
        let mut record = load_calibration(self.storage.as_ref(), queue_type, self.calibration_required_samples);
        record.begin();
        save_calibration(self.storage.as_ref(), queue_type, &record);
    }

    pub fn calibration_status(&self, queue_type: &QueueType) -> nomarr_core::CalibrationRecord {
        load_calibration(self.storage.as_ref(), queue_type, self.calibration_required_samples)
    }
}
