// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Storage Interface (§4.1): a trait over the five tables named in §3,
//! plus two implementations.
//!
//! `nomarr-queue`, `nomarr-supervisor`, and `nomarr-broker` are all generic
//! over `S: Storage` rather than depending on a concrete backend, the same
//! shape the teacher uses for its `Clock` abstraction.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod calibration;
mod error;
mod file;
mod mem;
mod snapshot;
mod tables;
mod wal;

pub use calibration::{load_calibration, save_calibration};
pub use error::StorageError;
pub use file::FileStorage;
pub use mem::MemStorage;
pub use tables::{HealthFilter, JobFilter, ScanOrder, Tables};

use nomarr_core::{Claim, HealthRecord, Job, JobId, JobStatus, RestartPolicyRow};

/// The Storage Interface named in §4.1: `insert`, `upsert`, `update_if`,
/// `get`, `scan`, `delete`, `tx`, specialized per table because the five
/// tables in §3 have fixed, unrelated schemas rather than a common row type.
///
/// `update_if` is the only mutation with compare-and-swap semantics; every
/// other write is unconditional, matching the teacher's read of "atomic
/// single-row updates" as applying specifically to the claim protocol.
pub trait Storage: Send + Sync {
    // -- jobs --

    /// Inserts a new job. Returns its id for convenience; callers already
    /// have it since `JobId` allocation happens in `nomarr-queue`, not here.
    fn insert_job(&self, job: Job) -> JobId;

    fn get_job(&self, id: JobId) -> Option<Job>;

    /// Applies `patch` iff `pred(&current_row)` holds, atomically with the
    /// read. Returns whether the patch was applied.
    fn update_job_if(&self, id: JobId, pred: &dyn Fn(&Job) -> bool, patch: &dyn Fn(&mut Job)) -> bool;

    /// Returns the matching rows (already ordered/paginated per `filter`)
    /// and the total match count before pagination, for caller-side "has
    /// more" logic.
    fn scan_jobs(&self, filter: &JobFilter) -> (Vec<Job>, usize);

    fn delete_jobs(&self, pred: &dyn Fn(&Job) -> bool) -> usize;

    // -- health --

    fn upsert_health(&self, record: HealthRecord);

    fn get_health(&self, component: &str) -> Option<HealthRecord>;

    fn update_health_if(
        &self,
        component: &str,
        pred: &dyn Fn(&HealthRecord) -> bool,
        patch: &dyn Fn(&mut HealthRecord),
    ) -> bool;

    fn scan_health(&self, filter: &HealthFilter) -> Vec<HealthRecord>;

    fn delete_health(&self, component: &str) -> bool;

    // -- worker_kv --

    fn set_kv(&self, key: String, value: String);

    fn get_kv(&self, key: &str) -> Option<String>;

    fn delete_kv(&self, pred: &dyn Fn(&str) -> bool) -> usize;

    /// Every `(key, value)` whose key starts with `prefix`, used by the
    /// supervisor to truncate the ephemeral `worker:*`/`job:*` namespaces
    /// on startup and shutdown (§4.4).
    fn scan_kv_prefix(&self, prefix: &str) -> Vec<(String, String)>;

    // -- claims --

    fn upsert_claim(&self, claim: Claim);

    fn get_claim(&self, resource_id: &str) -> Option<Claim>;

    fn delete_claim(&self, resource_id: &str) -> bool;

    fn scan_claims(&self, pred: &dyn Fn(&Claim) -> bool) -> Vec<Claim>;

    // -- restart_policy --

    fn get_restart_policy(&self, component: &str) -> Option<RestartPolicyRow>;

    fn upsert_restart_policy(&self, row: RestartPolicyRow);

    /// Runs `f` while holding the single lock domain all other operations
    /// share, so a multi-table read-modify-write (e.g. `claim_next`'s
    /// "pick a pending job, flip it to running") is all-or-nothing (§4.1).
    fn tx<R>(&self, f: impl FnOnce(&Self) -> R) -> R
    where
        Self: Sized;

    /// Writes every key under `worker:*`/`job:*`, consistent with
    /// `nomarr_core::kv::is_ephemeral`, used by the supervisor at startup
    /// and shutdown (§4.4: "the ephemeral worker_kv namespace is truncated").
    fn truncate_ephemeral_kv(&self) {
        self.delete_kv(&nomarr_core::kv::is_ephemeral);
    }
}
