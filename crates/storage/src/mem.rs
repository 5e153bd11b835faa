// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory `Storage` with no durability, used by every other crate's
//! tests (mirrors the teacher's `test-support` feature convention: a real
//! trait implementation, not a mock).

use crate::tables::{HealthFilter, JobFilter, ScanOrder, Tables};
use crate::wal::WalOp;
use crate::Storage;
use nomarr_core::{Claim, HealthRecord, Job, JobId, RestartPolicyRow};
use parking_lot::Mutex;

#[derive(Default)]
pub struct MemStorage {
    tables: Mutex<Tables>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tables(tables: Tables) -> Self {
        Self { tables: Mutex::new(tables) }
    }

    pub fn snapshot_tables(&self) -> Tables {
        self.tables.lock().clone()
    }

    /// Replays a single WAL entry's effect directly, bypassing the trait's
    /// `Storage` surface (used only by [`crate::FileStorage::open`] during
    /// recovery, where entries are already known-applied and shouldn't be
    /// re-logged).
    pub(crate) fn apply(&self, op: WalOp) {
        let mut tables = self.tables.lock();
        match op {
            WalOp::InsertJob(job) | WalOp::ReplaceJob(job) => {
                tables.jobs.insert(job.id, job);
            }
            WalOp::DeleteJob(id) => {
                tables.jobs.remove(&id);
            }
            WalOp::UpsertHealth(record) => {
                tables.health.insert(record.component.as_str().to_string(), record);
            }
            WalOp::DeleteHealth(component) => {
                tables.health.remove(&component);
            }
            WalOp::SetKv { key, value } => {
                tables.worker_kv.insert(key, value);
            }
            WalOp::DeleteKv(key) => {
                tables.worker_kv.remove(&key);
            }
            WalOp::UpsertClaim(claim) => {
                tables.claims.insert(claim.resource_id.clone(), claim);
            }
            WalOp::DeleteClaim(resource_id) => {
                tables.claims.remove(&resource_id);
            }
            WalOp::UpsertRestartPolicy(row) => {
                tables.restart_policy.insert(row.component.clone(), row);
            }
        }
    }

    /// Removes and returns every job matching `pred`, for callers (namely
    /// [`crate::FileStorage`]) that need to know exactly which rows were
    /// removed in order to log one `WalOp::DeleteJob` per id.
    pub(crate) fn remove_jobs_matching(&self, pred: &dyn Fn(&Job) -> bool) -> Vec<Job> {
        let mut tables = self.tables.lock();
        let (removed, kept): (Vec<Job>, Vec<Job>) = tables.jobs.drain().map(|(_, j)| j).partition(|j| pred(j));
        tables.jobs = kept.into_iter().map(|j| (j.id, j)).collect();
        removed
    }

    /// Removes and returns every `worker_kv` key matching `pred`.
    pub(crate) fn remove_kv_matching(&self, pred: &dyn Fn(&str) -> bool) -> Vec<String> {
        let mut tables = self.tables.lock();
        let removed: Vec<String> = tables.worker_kv.keys().filter(|k| pred(k)).cloned().collect();
        for key in &removed {
            tables.worker_kv.remove(key);
        }
        removed
    }
}

impl Storage for MemStorage {
    fn insert_job(&self, job: Job) -> JobId {
        let id = job.id;
        self.tables.lock().jobs.insert(id, job);
        id
    }

    fn get_job(&self, id: JobId) -> Option<Job> {
        self.tables.lock().jobs.get(&id).cloned()
    }

    fn update_job_if(&self, id: JobId, pred: &dyn Fn(&Job) -> bool, patch: &dyn Fn(&mut Job)) -> bool {
        let mut tables = self.tables.lock();
        match tables.jobs.get_mut(&id) {
            Some(job) if pred(job) => {
                patch(job);
                true
            }
            _ => false,
        }
    }

    fn scan_jobs(&self, filter: &JobFilter) -> (Vec<Job>, usize) {
        let tables = self.tables.lock();
        let mut matched: Vec<Job> = tables.jobs.values().filter(|j| filter.matches(j)).cloned().collect();
        match filter.order {
            Some(ScanOrder::CreatedAtAsc) | None => {
                matched.sort_by_key(|j| (j.created_at, j.id));
            }
            Some(ScanOrder::CreatedAtDesc) => {
                matched.sort_by_key(|j| (std::cmp::Reverse(j.created_at), j.id));
            }
        }
        let total = matched.len();
        let page = matched.into_iter().skip(filter.offset).take(filter.limit.unwrap_or(usize::MAX)).collect();
        (page, total)
    }

    fn delete_jobs(&self, pred: &dyn Fn(&Job) -> bool) -> usize {
        self.remove_jobs_matching(pred).len()
    }

    fn upsert_health(&self, record: HealthRecord) {
        self.tables.lock().health.insert(record.component.as_str().to_string(), record);
    }

    fn get_health(&self, component: &str) -> Option<HealthRecord> {
        self.tables.lock().health.get(component).cloned()
    }

    fn update_health_if(
        &self,
        component: &str,
        pred: &dyn Fn(&HealthRecord) -> bool,
        patch: &dyn Fn(&mut HealthRecord),
    ) -> bool {
        let mut tables = self.tables.lock();
        match tables.health.get_mut(component) {
            Some(record) if pred(record) => {
                patch(record);
                true
            }
            _ => false,
        }
    }

    fn scan_health(&self, filter: &HealthFilter) -> Vec<HealthRecord> {
        self.tables.lock().health.values().filter(|r| filter.matches(r)).cloned().collect()
    }

    fn delete_health(&self, component: &str) -> bool {
        self.tables.lock().health.remove(component).is_some()
    }

    fn set_kv(&self, key: String, value: String) {
        self.tables.lock().worker_kv.insert(key, value);
    }

    fn get_kv(&self, key: &str) -> Option<String> {
        self.tables.lock().worker_kv.get(key).cloned()
    }

    fn delete_kv(&self, pred: &dyn Fn(&str) -> bool) -> usize {
        self.remove_kv_matching(pred).len()
    }

    fn scan_kv_prefix(&self, prefix: &str) -> Vec<(String, String)> {
        self.tables
            .lock()
            .worker_kv
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn upsert_claim(&self, claim: Claim) {
        self.tables.lock().claims.insert(claim.resource_id.clone(), claim);
    }

    fn get_claim(&self, resource_id: &str) -> Option<Claim> {
        self.tables.lock().claims.get(resource_id).cloned()
    }

    fn delete_claim(&self, resource_id: &str) -> bool {
        self.tables.lock().claims.remove(resource_id).is_some()
    }

    fn scan_claims(&self, pred: &dyn Fn(&Claim) -> bool) -> Vec<Claim> {
        self.tables.lock().claims.values().filter(|c| pred(c)).cloned().collect()
    }

    fn get_restart_policy(&self, component: &str) -> Option<RestartPolicyRow> {
        self.tables.lock().restart_policy.get(component).cloned()
    }

    fn upsert_restart_policy(&self, row: RestartPolicyRow) {
        self.tables.lock().restart_policy.insert(row.component.clone(), row);
    }

    fn tx<R>(&self, f: impl FnOnce(&Self) -> R) -> R
    where
        Self: Sized,
    {
        // A single `parking_lot::Mutex` already serializes every operation
        // above; `tx` just gives callers a named seam to group several
        // calls as "one transaction" without taking the lock themselves
        // (which would deadlock against the calls inside `f`).
        f(self)
    }
}
