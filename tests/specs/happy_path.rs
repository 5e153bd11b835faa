// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! S1 (spec.md §8): enqueue one job, let the pool pick it up, see it reach
//! `done` both in the durable store and over a `queue:jobs` subscription.

use crate::prelude::*;
use nomarr_adapters::NullAdapter;
use nomarr_core::JobStatus;
use nomarr_storage::Storage as _;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn enqueued_job_is_claimed_processed_and_marked_done() {
    let harness = Harness::start(&[("tag", 1)], Arc::new(NullAdapter)).await;

    let (_handle, mut jobs_rx) = harness.control.subscribe(&[nomarr_broker::TOPIC_QUEUE_JOBS.to_string()]).unwrap();

    let id = harness.control.enqueue(&["/track.flac".to_string()], false)[0];

    advance(&harness.clock, Duration::from_millis(POLL_INTERVAL_MS * 6)).await;

    let mut statuses = Vec::new();
    while let Some(event) = jobs_rx.try_recv() {
        if let Some(status) = event.payload["status"].as_str() {
            statuses.push(status.to_string());
        }
    }
    assert!(statuses.first() == Some(&"pending".to_string()), "expected pending first, got {statuses:?}");
    assert_eq!(statuses.last(), Some(&"done".to_string()), "expected done last, got {statuses:?}");

    let job = harness.storage.get_job(id).expect("job row exists");
    assert_eq!(job.status, JobStatus::Done);
    assert!(job.result.is_some());
    assert!(job.finished_at.is_some());

    let snapshot = harness.control.status();
    assert_eq!(snapshot.queue_counts.get("done"), Some(&1));

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn multiple_jobs_in_one_queue_all_complete_in_fifo_order() {
    let harness = Harness::start(&[("tag", 1)], Arc::new(NullAdapter)).await;

    let ids = harness.control.enqueue(&["/a.flac".to_string(), "/b.flac".to_string(), "/c.flac".to_string()], false);

    advance(&harness.clock, Duration::from_millis(POLL_INTERVAL_MS * 12)).await;

    for id in &ids {
        let job = harness.storage.get_job(*id).expect("job row exists");
        assert_eq!(job.status, JobStatus::Done);
    }

    harness.shutdown().await;
}
