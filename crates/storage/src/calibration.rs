// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reads/writes [`CalibrationRecord`] through the `calibration:<queue>:*`
//! `worker_kv` namespace (SPEC_FULL.md §3). Lives here rather than in
//! `nomarr-worker`/`nomarr-control` individually since both need the exact
//! same KV encoding and neither should own the other's copy of it.

use crate::Storage;
use nomarr_core::{kv, CalibrationRecord, CalibrationState, QueueType};

/// Loads the calibration record for `queue`, defaulting to a fresh
/// `uncalibrated` record with `required_samples` if no KV rows exist yet.
pub fn load_calibration<S: Storage>(storage: &S, queue: &QueueType, required_samples: u32) -> CalibrationRecord {
    let state =
        storage.get_kv(&kv::calibration_state(queue)).and_then(|s| CalibrationState::parse(&s)).unwrap_or(CalibrationState::Uncalibrated);
    let sample_count =
        storage.get_kv(&kv::calibration_sample_count(queue)).and_then(|s| s.parse().ok()).unwrap_or(0);
    let promoted_at = storage.get_kv(&kv::calibration_promoted_at(queue)).and_then(|s| s.parse().ok());
    CalibrationRecord { state, sample_count, required_samples, promoted_at }
}

pub fn save_calibration<S: Storage>(storage: &S, queue: &QueueType, record: &CalibrationRecord) {
    storage.set_kv(kv::calibration_state(queue), record.state.as_str().to_string());
    storage.set_kv(kv::calibration_sample_count(queue), record.sample_count.to_string());
    match record.promoted_at {
        Some(ms) => storage.set_kv(kv::calibration_promoted_at(queue), ms.to_string()),
        None => {
            storage.delete_kv(&|k| k == kv::calibration_promoted_at(queue));
        }
    }
}
