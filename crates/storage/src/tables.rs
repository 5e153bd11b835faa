// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The five tables named in §3, held in memory behind a single lock domain
//! (see [`crate::mem::MemStorage`]) so that `update_if`'s compare-and-swap
//! guarantee holds across a whole table, not just a single row.

use nomarr_core::{Claim, HealthRecord, HealthStatus, Job, JobId, RestartPolicyRow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Tables {
    pub jobs: HashMap<JobId, Job>,
    pub health: HashMap<String, HealthRecord>,
    pub worker_kv: HashMap<String, String>,
    pub claims: HashMap<String, Claim>,
    pub restart_policy: HashMap<String, RestartPolicyRow>,
}

/// Sort order for [`crate::Storage::scan_jobs`] (§4.2: `claim_next` orders by
/// `created_at` ascending, `JobId` as a tiebreaker).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOrder {
    CreatedAtAsc,
    CreatedAtDesc,
}

/// Filter + pagination for a jobs scan (§4.1 `scan(table, filter, order, limit, offset)`).
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<nomarr_core::JobStatus>,
    pub order: Option<ScanOrder>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl JobFilter {
    pub fn matches(&self, job: &Job) -> bool {
        self.status.is_none_or(|s| job.status == s)
    }
}

/// Filter for a health scan, used by the Worker Supervisor's monitor tick.
#[derive(Debug, Clone, Default)]
pub struct HealthFilter {
    pub status: Option<HealthStatus>,
}

impl HealthFilter {
    pub fn matches(&self, record: &HealthRecord) -> bool {
        self.status.is_none_or(|s| record.status == s)
    }
}
