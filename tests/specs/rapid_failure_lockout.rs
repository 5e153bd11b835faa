// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! S3 (spec.md §8): a worker that keeps dying (not a job-level error — a
//! job-level `Recoverable` error never ends the process, see
//! `nomarr_adapters::AdapterError::worker_exit_code`) crosses the
//! rapid-failure threshold within the rapid window and gets locked out
//! (`HealthStatus::Failed`), with no further restart until an operator
//! clears it via `reset_restart_count`.

use crate::prelude::*;
use nomarr_adapters::NullAdapter;
use nomarr_core::{ComponentId, HealthStatus, QueueType};
use nomarr_storage::Storage as _;
use nomarr_supervisor::SupervisorConfig;
use std::sync::Arc;
use std::time::Duration;

fn fast_lockout_config(cfg: SupervisorConfig) -> SupervisorConfig {
    let mut cfg = cfg;
    cfg.rapid_threshold = 3;
    cfg.rapid_window_ms = 60_000;
    cfg.backoff_schedule_ms = vec![10, 10, 10, 10];
    cfg
}

#[tokio::test(start_paused = true)]
async fn repeated_crashes_within_the_rapid_window_lock_the_worker_out() {
    let harness = Harness::start_with(&[("tag", 1)], Arc::new(NullAdapter), fast_lockout_config).await;
    let component = ComponentId::worker(&QueueType::new("tag"), 0);

    // The tracker checks `restart_count >= rapid_threshold` *before*
    // incrementing, so lockout needs one more failure than the threshold:
    // three failures climb the count to 3, the fourth observes 3 >= 3.
    for attempt in 0..4 {
        assert!(harness.launcher.kill_component(component.as_str()).await, "attempt {attempt}: worker should be running");
        // Let the scheduled respawn's backoff (10ms) elapse.
        advance(&harness.clock, Duration::from_millis(50)).await;

        let health = harness.storage.get_health(component.as_str()).expect("health row exists");
        if attempt < 3 {
            assert_ne!(health.status, HealthStatus::Failed, "attempt {attempt}: should not be locked out yet");
        }
    }

    let health = harness.storage.get_health(component.as_str()).expect("health row exists");
    assert_eq!(health.status, HealthStatus::Failed);
    assert!(health.metadata.as_deref().is_some_and(|m| m.contains("rapid")));

    // No further restart happens on its own.
    assert!(!harness.launcher.is_running(component.as_str()));
    advance(&harness.clock, Duration::from_millis(500)).await;
    assert!(!harness.launcher.is_running(component.as_str()));

    let reset = harness.control.reset_restart_count(component.as_str()).await.unwrap();
    assert!(reset);
    advance(&harness.clock, Duration::from_millis(POLL_INTERVAL_MS * 2)).await;

    let health = harness.storage.get_health(component.as_str()).expect("health row exists");
    assert_ne!(health.status, HealthStatus::Failed);
    assert!(harness.launcher.is_running(component.as_str()));

    harness.shutdown().await;
}
