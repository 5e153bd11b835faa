// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! S4 (spec.md §8): while paused, workers stop claiming new jobs — already
//! `pending` work just sits there — and resuming lets them drain it.

use crate::prelude::*;
use nomarr_adapters::NullAdapter;
use nomarr_core::JobStatus;
use nomarr_storage::Storage as _;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn pausing_stops_new_claims_and_resuming_drains_the_backlog() {
    let harness = Harness::start(&[("tag", 1)], Arc::new(NullAdapter)).await;

    let was_paused = harness.control.pause();
    assert!(!was_paused);

    let ids = harness.control.enqueue(&["/a.flac".to_string(), "/b.flac".to_string(), "/c.flac".to_string()], false);

    // Several poll intervals pass with the pool paused: nothing should move.
    advance(&harness.clock, Duration::from_millis(POLL_INTERVAL_MS * 10)).await;
    for id in &ids {
        let job = harness.storage.get_job(*id).expect("job row exists");
        assert_eq!(job.status, JobStatus::Pending, "no job should be claimed while paused");
    }
    let snapshot = harness.control.status();
    assert_eq!(snapshot.queue_counts.get("pending"), Some(&3));
    assert!(snapshot.queue_counts.get("running").is_none());

    let was_paused = harness.control.resume();
    assert!(was_paused);

    advance(&harness.clock, Duration::from_millis(POLL_INTERVAL_MS * 12)).await;
    for id in &ids {
        let job = harness.storage.get_job(*id).expect("job row exists");
        assert_eq!(job.status, JobStatus::Done);
    }

    harness.shutdown().await;
}
