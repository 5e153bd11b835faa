// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use nomarr_core::QueueType;
use serde::{Deserialize, Serialize};

/// Constructor inputs for a [`crate::WorkerProcess`] (§4.3): everything
/// except the storage factory and `process_fn`, which are supplied
/// separately since they carry non-`Clone`, non-serializable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub name: String,
    pub queue_type: QueueType,
    pub worker_id: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_calibration_required_samples")]
    pub calibration_required_samples: u32,
    #[serde(default)]
    pub restart_count: u32,
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_heartbeat_interval_ms() -> u64 {
    5_000
}

fn default_calibration_required_samples() -> u32 {
    20
}

impl WorkerConfig {
    pub fn new(name: impl Into<String>, queue_type: QueueType, worker_id: u32) -> Self {
        Self {
            name: name.into(),
            queue_type,
            worker_id,
            poll_interval_ms: default_poll_interval_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            calibration_required_samples: default_calibration_required_samples(),
            restart_count: 0,
        }
    }
}
