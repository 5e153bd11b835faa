// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! S2 (spec.md §8): a worker dies mid-job with no orderly exit. The
//! supervisor notices via the stale-heartbeat path (`monitor_tick`), the
//! stuck job is reclaimed to `pending` (`Queue::reset_stuck`), the worker is
//! respawned, and the job eventually finishes.

use crate::prelude::*;
use async_trait::async_trait;
use nomarr_adapters::{AdapterError, TaggingAdapter};
use nomarr_core::{ComponentId, HealthStatus, JobStatus, QueueType};
use nomarr_storage::Storage as _;
use std::sync::Arc;
use std::time::Duration;

/// Never returns on its own — lets the test kill the worker while a job is
/// still `running`, the way a real process can die mid-inference.
struct SlowAdapter;

#[async_trait]
impl TaggingAdapter for SlowAdapter {
    async fn process(&self, _path: &str, _force: bool) -> Result<serde_json::Value, AdapterError> {
        tokio::time::sleep(Duration::from_secs(3_600)).await;
        unreachable!("test kills the worker long before this sleep elapses");
    }
}

#[tokio::test(start_paused = true)]
async fn a_killed_worker_s_stuck_job_is_reclaimed_and_the_worker_is_respawned() {
    let harness = Harness::start(&[("tag", 1)], Arc::new(SlowAdapter)).await;
    let component = ComponentId::worker(&QueueType::new("tag"), 0);

    let id = harness.control.enqueue(&["/track.flac".to_string()], false)[0];

    // Give the worker time to claim the job; it's now parked inside the
    // adapter's sleep with the job marked `running`.
    advance(&harness.clock, Duration::from_millis(POLL_INTERVAL_MS * 2)).await;
    let job = harness.storage.get_job(id).expect("job row exists");
    assert_eq!(job.status, JobStatus::Running);
    assert_eq!(job.worker_id.as_ref().map(|w| w.as_str()), Some(component.as_str()));

    assert!(harness.launcher.kill_component(component.as_str()).await, "worker should have been running");

    // Past the stale-heartbeat threshold, the next monitor tick reclaims
    // the stuck job and marks the worker `crashed`, scheduling a respawn.
    advance(&harness.clock, Duration::from_millis(HEARTBEAT_STALE_MS + MONITOR_INTERVAL_MS * 2)).await;

    let job = harness.storage.get_job(id).expect("job row exists");
    assert_eq!(job.status, JobStatus::Pending, "stuck job should have been reclaimed");

    let health = harness.storage.get_health(component.as_str()).expect("health row exists");
    assert!(matches!(health.status, HealthStatus::Crashed | HealthStatus::Starting | HealthStatus::Healthy));

    // Let the first backoff rung (1000ms) elapse so the respawn happens,
    // then give the new worker a moment to re-claim the reclaimed job.
    advance(&harness.clock, Duration::from_millis(1_500)).await;
    advance(&harness.clock, Duration::from_millis(POLL_INTERVAL_MS * 4)).await;

    let job = harness.storage.get_job(id).expect("job row exists");
    assert_eq!(job.status, JobStatus::Running, "respawned worker should have re-claimed the job");

    let health = harness.storage.get_health(component.as_str()).expect("health row exists");
    assert_eq!(health.restart_count, 1);

    harness.shutdown().await;
}
