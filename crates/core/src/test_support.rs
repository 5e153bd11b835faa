// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test-only builders and proptest strategies, gated behind the
//! `test-support` feature so downstream crates can depend on this without
//! pulling test code into release builds (mirrors the teacher's
//! `oj-core::test_support` convention).

use crate::health::{HealthRecord, HealthStatus};
use crate::ids::{ComponentId, JobId};
use crate::job::{Job, JobStatus};

/// Builder for [`Job`] with sensible test defaults, following the
/// `*Builder` pattern used throughout the upstream corpus.
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new(id: u64) -> Self {
        Self { job: Job::new_pending(JobId::new(id), "/tmp/test.flac", false, 1_000) }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.job.path = path.into();
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.job.force = force;
        self
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.job.status = status;
        self
    }

    pub fn worker(mut self, worker_id: ComponentId) -> Self {
        self.job.worker_id = Some(worker_id);
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

/// Builder for [`HealthRecord`] with sensible test defaults.
pub struct HealthRecordBuilder {
    record: HealthRecord,
}

impl HealthRecordBuilder {
    pub fn new(component: ComponentId) -> Self {
        Self { record: HealthRecord::starting(component, 4242, 1_000, 0) }
    }

    pub fn status(mut self, status: HealthStatus) -> Self {
        self.record.status = status;
        self
    }

    pub fn last_heartbeat(mut self, ms: u64) -> Self {
        self.record.last_heartbeat = ms;
        self
    }

    pub fn restart_count(mut self, count: u32) -> Self {
        self.record.restart_count = count;
        self
    }

    pub fn build(self) -> HealthRecord {
        self.record
    }
}

#[cfg(feature = "proptest")]
pub mod strategies {
    use crate::job::JobStatus;
    use proptest::prelude::*;

    /// A proptest strategy over the four [`JobStatus`] variants, used by
    /// `nomarr-queue`'s state-machine property tests.
    pub fn any_job_status() -> impl Strategy<Value = JobStatus> {
        prop_oneof![
            Just(JobStatus::Pending),
            Just(JobStatus::Running),
            Just(JobStatus::Done),
            Just(JobStatus::Error),
        ]
    }
}
