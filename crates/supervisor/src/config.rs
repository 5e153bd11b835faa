// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use indexmap::IndexMap;
use nomarr_core::QueueType;
use serde::{Deserialize, Serialize};

/// Tuning knobs for [`crate::Supervisor`], defaulted per §6's config table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Worker process count per queue type, e.g. `{"tag": 2, "scan": 1}`.
    /// An `IndexMap` keeps pool bring-up order deterministic across runs,
    /// matching the teacher's preference for insertion-ordered maps over
    /// `HashMap` wherever iteration order is externally observable (logs,
    /// startup sequencing).
    pub pools: IndexMap<String, u32>,

    /// Path to the `nmr-worker` binary the launcher execs.
    pub worker_binary_path: String,

    /// State directory passed through to every spawned worker.
    pub state_dir: String,

    #[serde(default = "default_heartbeat_stale_ms")]
    pub heartbeat_stale_ms: u64,

    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,

    #[serde(default = "default_backoff_schedule_ms")]
    pub backoff_schedule_ms: Vec<u64>,

    #[serde(default = "default_rapid_window_ms")]
    pub rapid_window_ms: u64,

    #[serde(default = "default_rapid_threshold")]
    pub rapid_threshold: u32,

    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub worker_poll_interval_ms: u64,

    #[serde(default = "default_heartbeat_interval_ms")]
    pub worker_heartbeat_interval_ms: u64,
}

fn default_heartbeat_stale_ms() -> u64 {
    30_000
}

fn default_monitor_interval_ms() -> u64 {
    10_000
}

fn default_backoff_schedule_ms() -> Vec<u64> {
    vec![1_000, 2_000, 4_000, 8_000, 16_000, 32_000, 60_000]
}

fn default_rapid_window_ms() -> u64 {
    300_000
}

fn default_rapid_threshold() -> u32 {
    5
}

fn default_shutdown_grace_ms() -> u64 {
    10_000
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_heartbeat_interval_ms() -> u64 {
    5_000
}

impl SupervisorConfig {
    pub fn new(worker_binary_path: impl Into<String>, state_dir: impl Into<String>) -> Self {
        Self {
            pools: IndexMap::new(),
            worker_binary_path: worker_binary_path.into(),
            state_dir: state_dir.into(),
            heartbeat_stale_ms: default_heartbeat_stale_ms(),
            monitor_interval_ms: default_monitor_interval_ms(),
            backoff_schedule_ms: default_backoff_schedule_ms(),
            rapid_window_ms: default_rapid_window_ms(),
            rapid_threshold: default_rapid_threshold(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            worker_poll_interval_ms: default_poll_interval_ms(),
            worker_heartbeat_interval_ms: default_heartbeat_interval_ms(),
        }
    }

    pub fn with_pool(mut self, queue_type: impl Into<String>, count: u32) -> Self {
        self.pools.insert(queue_type.into(), count);
        self
    }

    /// Every `(QueueType, worker_id)` slot this config expects to be running,
    /// in pool-declaration order (§4.4: "supervisor brings up N workers per
    /// queue type at startup").
    pub fn slots(&self) -> Vec<(QueueType, u32)> {
        self.pools
            .iter()
            .flat_map(|(queue_type, &count)| (0..count).map(move |id| (QueueType::new(queue_type), id)))
            .collect()
    }
}
