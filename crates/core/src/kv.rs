// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Namespace key builders for the `worker_kv` table (§3 Worker-KV Entry).
//!
//! `worker_kv` has no schema beyond `(key, value)`; the namespaces below are
//! convention, enforced only by construction through these helpers so the
//! string format can't drift between the worker, supervisor, broker, and
//! control-plane crates that all read/write them.

use crate::ids::{JobId, QueueType};

pub fn job_status(id: JobId) -> String {
    format!("job:{id}:status")
}

pub fn job_path(id: JobId) -> String {
    format!("job:{id}:path")
}

pub fn job_calibration_gated(id: JobId) -> String {
    format!("job:{id}:calibration_gated")
}

pub fn worker_current_job(queue: &QueueType, worker_id: u32) -> String {
    format!("worker:{queue}:{worker_id}:current_job")
}

pub fn control_paused() -> &'static str {
    "control:paused"
}

pub fn control_shutdown() -> &'static str {
    "control:shutdown"
}

pub fn calibration_state(queue: &QueueType) -> String {
    format!("calibration:{queue}:state")
}

pub fn calibration_sample_count(queue: &QueueType) -> String {
    format!("calibration:{queue}:sample_count")
}

pub fn calibration_promoted_at(queue: &QueueType) -> String {
    format!("calibration:{queue}:promoted_at")
}

/// True if `key` falls under the ephemeral `worker:*` or `job:*`
/// namespaces truncated at supervisor startup/shutdown (§4.4).
pub fn is_ephemeral(key: &str) -> bool {
    key.starts_with("worker:") || key.starts_with("job:")
}
