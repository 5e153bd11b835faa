// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! S5 (spec.md §8): a subscriber with a small buffer that never drains falls
//! behind a busy queue. Instead of blocking the broker (or the queue it
//! watches), the oldest buffered events are dropped and replaced with a
//! single `lagged` marker carrying the skipped count — see
//! `crates/broker/src/channel.rs`.

use crate::prelude::*;
use nomarr_adapters::NullAdapter;
use nomarr_core::JobStatus;
use nomarr_storage::Storage as _;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn a_subscriber_with_a_small_buffer_falls_behind_without_blocking_the_queue() {
    let harness = Harness::start(&[("tag", 4)], Arc::new(NullAdapter)).await;

    let (_handle, mut rx) = harness
        .control
        .subscribe_with_buffer(&[nomarr_broker::TOPIC_QUEUE_JOBS.to_string()], 4)
        .unwrap();

    let paths: Vec<String> = (0..30).map(|i| format!("/track-{i}.flac")).collect();
    let ids = harness.control.enqueue(&paths, false);

    // Never drained during the run: the queue must still finish every job
    // despite the subscriber falling arbitrarily far behind.
    advance(&harness.clock, Duration::from_millis(POLL_INTERVAL_MS * 20)).await;

    for id in &ids {
        let job = harness.storage.get_job(*id).expect("job row exists");
        assert_eq!(job.status, JobStatus::Done, "backpressure on a subscriber must not stall the queue");
    }

    let mut delivered = 0usize;
    let mut lagged_total = 0u64;
    while let Some(event) = rx.try_recv() {
        if event.event_type == "lagged" {
            lagged_total += event.payload["skipped"].as_u64().unwrap();
        } else {
            delivered += 1;
        }
    }
    assert!(delivered <= 4, "buffer holds at most 4 real events, got {delivered}");
    assert!(lagged_total > 0, "a busy 30-job run through a buffer of 4 must drop something");

    harness.shutdown().await;
}
