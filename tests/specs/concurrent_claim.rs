// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! S6 (spec.md §8): several workers in the same pool poll the same queue
//! concurrently. Exactly one of them claims a given job; the rest stay idle
//! until it's theirs.

use crate::prelude::*;
use nomarr_adapters::NullAdapter;
use nomarr_core::JobStatus;
use nomarr_storage::Storage as _;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn only_one_of_several_pool_workers_claims_a_single_pending_job() {
    let harness = Harness::start(&[("tag", 4)], Arc::new(NullAdapter)).await;

    let id = harness.control.enqueue(&["/track.flac".to_string()], false)[0];

    advance(&harness.clock, Duration::from_millis(POLL_INTERVAL_MS * 2)).await;

    let job = harness.storage.get_job(id).expect("job row exists");
    assert_eq!(job.status, JobStatus::Running);
    let claimed_by = job.worker_id.clone().expect("a claimed job has a worker_id");

    advance(&harness.clock, Duration::from_millis(POLL_INTERVAL_MS * 6)).await;

    let job = harness.storage.get_job(id).expect("job row exists");
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.worker_id.as_ref(), Some(&claimed_by), "the job must stay with the worker that claimed it");

    // None of the other three pool workers ever touched it.
    let all_workers: HashSet<String> = (0..4).map(|i| format!("worker:tag:{i}")).collect();
    assert!(all_workers.contains(claimed_by.as_str()), "unexpected worker id {claimed_by}");

    harness.shutdown().await;
}
