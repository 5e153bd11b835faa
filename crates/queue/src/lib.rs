// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Job Queue (§4.2): a durable, at-most-one-concurrent-execution pool of
//! work units built directly on the [`nomarr_storage::Storage`] trait.
//!
//! `Queue` is generic over both the storage backend and the [`Clock`], the
//! same shape `nomarr-core` uses throughout so tests can drive `claim_next`
//! / `reset_stuck` against a [`FakeClock`] instead of sleeping.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod error;

pub use error::QueueError;

use nomarr_core::{Clock, ComponentId, Job, JobId, JobStatus};
use nomarr_storage::{JobFilter, ScanOrder, Storage};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

pub struct Queue<S, C> {
    storage: Arc<S>,
    clock: C,
    next_id: AtomicU64,
}

impl<S, C> Queue<S, C>
where
    S: Storage,
    C: Clock,
{
    /// Opens a queue over an already-populated storage backend, seeding the
    /// monotonic id counter from the highest existing job id so restarts
    /// never reissue an id (§3 Job: "id (monotonic)").
    pub fn new(storage: Arc<S>, clock: C) -> Self {
        let (existing, _) = storage.scan_jobs(&JobFilter::default());
        let next = existing.iter().map(|j| j.id.get()).max().map(|n| n + 1).unwrap_or(1);
        Self { storage, clock, next_id: AtomicU64::new(next) }
    }

    /// Inserts a new `pending` job. Deduplication is not performed here —
    /// §4.2 leaves dedup to callers (Open Question 2, resolved in DESIGN.md).
    pub fn enqueue(&self, path: impl Into<String>, force: bool) -> JobId {
        let id = JobId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let job = Job::new_pending(id, path, force, self.clock.epoch_ms());
        self.storage.insert_job(job);
        id
    }

    /// Atomically selects the oldest `pending` row (ties broken by id) and
    /// transitions it to `running`. Contending callers that lose the CAS
    /// keep scanning forward rather than retrying the same row, so two
    /// workers racing on one pending job never both retry into a livelock.
    pub fn claim_next(&self, worker_id: &ComponentId) -> Option<Job> {
        let (candidates, _) = self.storage.scan_jobs(&JobFilter {
            status: Some(JobStatus::Pending),
            order: Some(ScanOrder::CreatedAtAsc),
            ..Default::default()
        });

        let now = self.clock.epoch_ms();
        for candidate in candidates {
            let id = candidate.id;
            let applied = self.storage.update_job_if(
                id,
                &|job| job.status == JobStatus::Pending,
                &|job| {
                    job.status = JobStatus::Running;
                    job.started_at = Some(now);
                    job.worker_id = Some(worker_id.clone());
                },
            );
            if applied {
                return self.storage.get_job(id);
            }
        }
        None
    }

    /// Requires `status == running`; otherwise a no-op (§4.2 Idempotence:
    /// covers the race where `reset_stuck` beats a late worker completion).
    pub fn mark_done(&self, job_id: JobId, result: Option<serde_json::Value>) {
        let now = self.clock.epoch_ms();
        let applied = self.storage.update_job_if(
            job_id,
            &|job| job.status == JobStatus::Running,
            &|job| {
                job.status = JobStatus::Done;
                job.finished_at = Some(now);
                job.result = result.clone();
            },
        );
        if !applied {
            warn!(job_id = %job_id, "mark_done on a job no longer running; ignored");
        }
    }

    /// Requires `status == running`; otherwise a no-op, mirroring `mark_done`.
    pub fn mark_error(&self, job_id: JobId, message: impl Into<String>) {
        let now = self.clock.epoch_ms();
        let message = message.into();
        let applied = self.storage.update_job_if(
            job_id,
            &|job| job.status == JobStatus::Running,
            &|job| {
                job.status = JobStatus::Error;
                job.finished_at = Some(now);
                job.error_message = Some(message.clone());
            },
        );
        if !applied {
            warn!(job_id = %job_id, "mark_error on a job no longer running; ignored");
        }
    }

    /// Scans `running` jobs whose owning worker's heartbeat is older than
    /// `threshold_ms` (or whose worker has no health row at all), and
    /// transitions them back to `pending`, preserving `created_at` per
    /// DESIGN.md's Open Question 1 decision.
    pub fn reset_stuck(&self, threshold_ms: u64) -> usize {
        let now = self.clock.epoch_ms();
        let (running, _) = self.storage.scan_jobs(&JobFilter { status: Some(JobStatus::Running), ..Default::default() });

        let mut count = 0;
        for job in running {
            let stale = match &job.worker_id {
                Some(worker) => match self.storage.get_health(worker.as_str()) {
                    Some(health) => health.is_stale(now, threshold_ms),
                    None => true,
                },
                None => true,
            };
            if !stale {
                continue;
            }
            let applied = self.storage.update_job_if(
                job.id,
                &|job| job.status == JobStatus::Running,
                &|job| {
                    job.status = JobStatus::Pending;
                    job.started_at = None;
                    job.worker_id = None;
                },
            );
            if applied {
                count += 1;
            }
        }
        count
    }

    /// Bulk `error -> pending`, clearing error fields. A subsequent
    /// `claim_next` surfaces these in `created_at` order since it was never
    /// mutated (§8 round-trip law).
    pub fn reset_errors(&self) -> usize {
        let (errored, _) = self.storage.scan_jobs(&JobFilter { status: Some(JobStatus::Error), ..Default::default() });
        let mut count = 0;
        for job in errored {
            let applied = self.storage.update_job_if(
                job.id,
                &|job| job.status == JobStatus::Error,
                &|job| {
                    job.status = JobStatus::Pending;
                    job.started_at = None;
                    job.finished_at = None;
                    job.worker_id = None;
                    job.error_message = None;
                },
            );
            if applied {
                count += 1;
            }
        }
        count
    }

    pub fn get(&self, job_id: JobId) -> Option<Job> {
        self.storage.get_job(job_id)
    }

    pub fn list(&self, filter: &JobFilter) -> (Vec<Job>, usize) {
        self.storage.scan_jobs(filter)
    }

    pub fn delete(&self, job_id: JobId) -> bool {
        self.storage.delete_jobs(&|job| job.id == job_id) > 0
    }

    pub fn delete_by_status(&self, statuses: &HashSet<JobStatus>) -> usize {
        self.storage.delete_jobs(&|job| statuses.contains(&job.status))
    }

    /// Deletes terminal jobs (`done`/`error`) finished more than `age_ms` ago
    /// (§1 non-goal: "persistent job history beyond a configurable retention
    /// horizon" is explicitly not guaranteed).
    pub fn retention_cleanup(&self, age_ms: u64) -> usize {
        let now = self.clock.epoch_ms();
        self.storage.delete_jobs(&|job| match job.finished_at {
            Some(finished_at) if job.status.is_terminal() => now.saturating_sub(finished_at) >= age_ms,
            _ => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nomarr_core::{FakeClock, HealthRecord, HealthStatus};
    use nomarr_storage::MemStorage;

    fn queue() -> Queue<MemStorage, FakeClock> {
        Queue::new(Arc::new(MemStorage::new()), FakeClock::new())
    }

    #[test]
    fn enqueue_claim_mark_done_round_trips_through_exact_states() {
        let q = queue();
        let id = q.enqueue("/a.flac", false);
        let worker = ComponentId::worker(&"tag".into(), 0);

        let claimed = q.claim_next(&worker).expect("job claimed");
        assert_eq!(claimed.id, id);
        assert_eq!(claimed.status, JobStatus::Running);

        q.mark_done(id, Some(serde_json::json!({"tags": ["rock"]})));
        let job = q.get(id).unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn concurrent_claim_on_single_job_has_exactly_one_winner() {
        let q = queue();
        q.enqueue("/a.flac", false);
        let w0 = ComponentId::worker(&"tag".into(), 0);
        let w1 = ComponentId::worker(&"tag".into(), 1);

        let first = q.claim_next(&w0);
        let second = q.claim_next(&w1);
        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[test]
    fn claim_next_orders_by_created_at_then_id() {
        let storage = Arc::new(MemStorage::new());
        let clock = FakeClock::new();
        let q = Queue::new(storage, clock.clone());
        let first = q.enqueue("/a.flac", false);
        clock.advance(std::time::Duration::from_millis(10));
        let _second = q.enqueue("/b.flac", false);

        let worker = ComponentId::worker(&"tag".into(), 0);
        let claimed = q.claim_next(&worker).unwrap();
        assert_eq!(claimed.id, first);
    }

    #[test]
    fn mark_done_on_non_running_job_is_idempotent_no_op() {
        let q = queue();
        let id = q.enqueue("/a.flac", false);
        // never claimed, still pending
        q.mark_done(id, None);
        assert_eq!(q.get(id).unwrap().status, JobStatus::Pending);
    }

    #[test]
    fn reset_stuck_returns_job_whose_worker_heartbeat_is_stale() {
        let storage = Arc::new(MemStorage::new());
        let clock = FakeClock::new();
        let q = Queue::new(storage.clone(), clock.clone());
        let id = q.enqueue("/a.flac", false);
        let worker = ComponentId::worker(&"tag".into(), 0);
        q.claim_next(&worker).unwrap();

        storage.upsert_health(HealthRecord {
            component: worker.clone(),
            last_heartbeat: clock.epoch_ms(),
            status: HealthStatus::Healthy,
            pid: 1,
            current_job: Some(id),
            restart_count: 0,
            last_restart: None,
            exit_code: None,
            metadata: None,
        });

        clock.advance(std::time::Duration::from_secs(5));
        let reset = q.reset_stuck(1_000);
        assert_eq!(reset, 1);
        let job = q.get(id).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.worker_id.is_none());
        assert!(job.started_at.is_none());
    }

    #[test]
    fn reset_stuck_preserves_created_at() {
        let storage = Arc::new(MemStorage::new());
        let clock = FakeClock::new();
        let q = Queue::new(storage, clock.clone());
        let id = q.enqueue("/a.flac", false);
        let created_at = q.get(id).unwrap().created_at;
        let worker = ComponentId::worker(&"tag".into(), 0);
        q.claim_next(&worker).unwrap();

        // No health row at all counts as stale.
        clock.advance(std::time::Duration::from_secs(100));
        q.reset_stuck(1_000);

        assert_eq!(q.get(id).unwrap().created_at, created_at);
    }

    #[test]
    fn reset_errors_surfaces_every_errored_job_in_created_at_order() {
        let storage = Arc::new(MemStorage::new());
        let clock = FakeClock::new();
        let q = Queue::new(storage, clock.clone());
        let worker = ComponentId::worker(&"tag".into(), 0);

        let first = q.enqueue("/a.flac", false);
        clock.advance(std::time::Duration::from_millis(1));
        let second = q.enqueue("/b.flac", false);

        q.claim_next(&worker).unwrap();
        q.mark_error(first, "boom");
        let claimed_second = q.claim_next(&worker).unwrap();
        assert_eq!(claimed_second.id, second);
        q.mark_error(second, "boom again");

        let reset = q.reset_errors();
        assert_eq!(reset, 2);

        let claimed = q.claim_next(&worker).unwrap();
        assert_eq!(claimed.id, first);
    }

    #[test]
    fn retention_cleanup_only_removes_old_terminal_jobs() {
        let storage = Arc::new(MemStorage::new());
        let clock = FakeClock::new();
        let q = Queue::new(storage, clock.clone());
        let worker = ComponentId::worker(&"tag".into(), 0);

        let id = q.enqueue("/a.flac", false);
        q.claim_next(&worker).unwrap();
        q.mark_done(id, None);

        assert_eq!(q.retention_cleanup(1_000), 0);
        clock.advance(std::time::Duration::from_secs(10));
        assert_eq!(q.retention_cleanup(1_000), 1);
        assert!(q.get(id).is_none());
    }
}
