// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Job entity and its status state machine (§3).

use crate::ids::{ComponentId, JobId};
use crate::macros::simple_display;
use serde::{Deserialize, Serialize};

/// `pending → running → {done, error}`, with `pending ← running` only via
/// `reset_stuck`/`reset_errors`. No other edges exist (§8 invariant 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Error,
}

simple_display! {
    JobStatus {
        Pending => "pending",
        Running => "running",
        Done => "done",
        Error => "error",
    }
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }
}

/// One unit of work for a path (§3 Job).
///
/// Invariants enforced by `nomarr-queue`, not by this struct directly:
/// exactly one status at a time; `started_at` set iff
/// `status ∈ {running, done, error}`; `finished_at` set iff
/// `status ∈ {done, error}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub path: String,
    pub force: bool,
    pub status: JobStatus,
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub finished_at: Option<u64>,
    pub worker_id: Option<ComponentId>,
    pub error_message: Option<String>,
    /// Opaque result blob. Only `status` is interpreted by the core — higher
    /// layers parse tag content out of this (§9 Design Notes).
    pub result: Option<serde_json::Value>,
}

impl Job {
    /// Construct a freshly enqueued, `pending` job.
    pub fn new_pending(id: JobId, path: impl Into<String>, force: bool, created_at: u64) -> Self {
        Self {
            id,
            path: path.into(),
            force,
            status: JobStatus::Pending,
            created_at,
            started_at: None,
            finished_at: None,
            worker_id: None,
            error_message: None,
            result: None,
        }
    }
}
