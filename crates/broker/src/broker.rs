// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The State Broker (§4.5): a single polling loop that diffs health/job
//! state against an in-memory snapshot and fans out changes onto per-topic
//! `tokio::sync::broadcast` channels.

use crate::channel::{self, EventReceiver};
use crate::error::BrokerError;
use crate::event::{parse_worker_status_topic, worker_status_topic, Event, TOPIC_QUEUE_JOBS, TOPIC_QUEUE_STATS, TOPIC_SYSTEM_HEALTH, TOPIC_WORKERS_WILDCARD};
use nomarr_core::{kv, Clock, HealthRecord, HealthStatus, Job, JobId, JobStatus};
use nomarr_storage::{HealthFilter, JobFilter, Storage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Per-topic broadcast ring buffer size and each subscriber's own forwarding
/// buffer (§4.5: "bounded in-memory buffer (default 64)").
const CHANNEL_CAPACITY: usize = 64;

/// A live subscription. Dropping this without calling [`Self::unsubscribe`]
/// leaves the forwarder tasks running until the delivery channel itself is
/// dropped, since the tasks hold only a clone of the cancellation token.
pub struct SubscriptionHandle {
    cancel: CancellationToken,
}

impl SubscriptionHandle {
    /// Idempotent: calling this more than once, or after the channel is
    /// already closed, is a no-op (§4.5 Cancellation).
    pub fn unsubscribe(&self) {
        self.cancel.cancel();
    }
}

pub struct Broker<S, C> {
    storage: Arc<S>,
    clock: C,
    tick_ms: u64,
    subscriber_buffer: usize,
    queue_jobs: broadcast::Sender<Event>,
    queue_stats: broadcast::Sender<Event>,
    system_health: broadcast::Sender<Event>,
    workers_wildcard: broadcast::Sender<Event>,
    per_worker: Mutex<HashMap<String, broadcast::Sender<Event>>>,
    /// Last-emitted payload per dedup key, used to emit only on change.
    previous: Mutex<HashMap<String, serde_json::Value>>,
}

impl<S, C> Broker<S, C>
where
    S: Storage + 'static,
    C: Clock,
{
    pub fn new(storage: Arc<S>, clock: C, tick_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            storage,
            clock,
            tick_ms,
            subscriber_buffer: CHANNEL_CAPACITY,
            queue_jobs: broadcast::channel(CHANNEL_CAPACITY).0,
            queue_stats: broadcast::channel(CHANNEL_CAPACITY).0,
            system_health: broadcast::channel(CHANNEL_CAPACITY).0,
            workers_wildcard: broadcast::channel(CHANNEL_CAPACITY).0,
            per_worker: Mutex::new(HashMap::new()),
            previous: Mutex::new(HashMap::new()),
        })
    }

    /// Runs the poll loop until `cancel` fires. The poller itself never
    /// panics on a bad read — a single tick's failure just produces no
    /// events, consistent with "the Broker must survive subscriber panics"
    /// extended to its own transient read errors.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(Duration::from_millis(self.tick_ms));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.poll_once(),
            }
        }
    }

    /// One tick of the contract in §4.5: health snapshot, per-worker
    /// current-job lookups, aggregate queue stats, diffed against the
    /// previous tick and emitted only on change.
    pub fn poll_once(&self) {
        let now = self.clock.epoch_ms();
        self.poll_health(now);

        let (jobs, _) = self.storage.scan_jobs(&JobFilter::default());
        self.poll_job_changes(&jobs, now);
        self.poll_queue_stats(&jobs, now);
    }

    /// §6: `system:health` carries the app's own heartbeat age plus an
    /// aggregate over every worker's Health row; `worker:<q>:<id>:status`
    /// carries that worker's own row. Both need the full scan before either
    /// is emitted, so this collects first and emits in a second pass.
    fn poll_health(&self, now: u64) {
        let records = self.storage.scan_health(&HealthFilter::default());

        let mut app_record: Option<&HealthRecord> = None;
        let mut workers_alive = 0u64;
        let mut workers_failed = 0u64;
        for record in &records {
            if record.component.is_app() {
                app_record = Some(record);
                continue;
            }
            match record.status {
                HealthStatus::Starting | HealthStatus::Healthy => workers_alive += 1,
                HealthStatus::Crashed | HealthStatus::Failed => workers_failed += 1,
                HealthStatus::Stopping | HealthStatus::Stopped => {}
            }
        }

        if let Some(app) = app_record {
            let payload = serde_json::json!({
                "app_heartbeat_age_ms": now.saturating_sub(app.last_heartbeat),
                "workers_alive": workers_alive,
                "workers_failed": workers_failed,
            });
            self.emit_if_changed("system:health".to_string(), TOPIC_SYSTEM_HEALTH, &self.system_health, payload, now);
        }

        for record in &records {
            if record.component.is_app() {
                continue;
            }
            let Some((queue_type, worker_id)) = record.component.parse_worker() else { continue };
            let current_job = self.storage.get_kv(&kv::worker_current_job(&queue_type, worker_id)).and_then(|raw| raw.parse::<u64>().ok());
            let current_job_detail = current_job.map(|job_id| {
                let status = self.storage.get_kv(&kv::job_status(JobId::new(job_id)));
                let path = self.storage.get_kv(&kv::job_path(JobId::new(job_id)));
                serde_json::json!({ "job_id": job_id, "status": status, "path": path })
            });

            let payload = serde_json::json!({
                "component": record.component.as_str(),
                "status": record.status,
                "pid": record.pid,
                "last_heartbeat": record.last_heartbeat,
                "current_job": current_job_detail,
                "restart_count": record.restart_count,
            });

            let topic = worker_status_topic(&queue_type, worker_id);
            let sender = self.per_worker_sender(&topic);
            let changed = self.emit_if_changed(topic.clone(), &topic, &sender, payload.clone(), now);
            if changed {
                let _ = self.workers_wildcard.send(Event::new("worker_status", topic, payload, now));
            }
        }
    }

    fn poll_job_changes(&self, jobs: &[Job], now: u64) {
        for job in jobs {
            let dedup_key = format!("job:{}", job.id);
            let payload = serde_json::json!({
                "job_id": job.id.get(),
                "path": job.path,
                "status": job.status,
                "worker_id": job.worker_id.as_ref().map(|w| w.as_str().to_string()),
                "error": job.error_message,
            });
            self.emit_if_changed(dedup_key, TOPIC_QUEUE_JOBS, &self.queue_jobs, payload, now);
        }
    }

    /// §6: `queue:stats` → `{pending, running, done, error, avg_ms, eta_ms}`.
    /// `avg_ms` is the mean wall-clock duration of jobs that have finished;
    /// `eta_ms` projects that average across every job not yet done, which
    /// is exact for a single-worker queue and a conservative (serial) upper
    /// bound once more than one worker is draining the same queue.
    fn poll_queue_stats(&self, jobs: &[Job], now: u64) {
        let mut pending = 0u64;
        let mut running = 0u64;
        let mut done = 0u64;
        let mut error = 0u64;
        let mut total_duration_ms = 0u64;
        let mut completed_with_duration = 0u64;

        for job in jobs {
            match job.status {
                JobStatus::Pending => pending += 1,
                JobStatus::Running => running += 1,
                JobStatus::Done => {
                    done += 1;
                    if let (Some(started), Some(finished)) = (job.started_at, job.finished_at) {
                        total_duration_ms += finished.saturating_sub(started);
                        completed_with_duration += 1;
                    }
                }
                JobStatus::Error => error += 1,
            }
        }

        let avg_ms = (completed_with_duration > 0).then(|| total_duration_ms / completed_with_duration);
        let eta_ms = avg_ms.map(|avg| avg * (pending + running));

        let payload = serde_json::json!({
            "pending": pending,
            "running": running,
            "done": done,
            "error": error,
            "avg_ms": avg_ms,
            "eta_ms": eta_ms,
        });
        self.emit_if_changed("queue:stats".to_string(), TOPIC_QUEUE_STATS, &self.queue_stats, payload, now);
    }

    fn per_worker_sender(&self, topic: &str) -> broadcast::Sender<Event> {
        let mut per_worker = self.per_worker.lock();
        per_worker.entry(topic.to_string()).or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0).clone()
    }

    fn emit_if_changed(&self, dedup_key: String, topic: &str, sender: &broadcast::Sender<Event>, payload: serde_json::Value, now: u64) -> bool {
        let mut previous = self.previous.lock();
        let changed = previous.get(&dedup_key) != Some(&payload);
        if changed {
            previous.insert(dedup_key, payload.clone());
            drop(previous);
            let _ = sender.send(Event::new("state_change", topic.to_string(), payload, now));
        }
        changed
    }

    fn receiver_for(&self, pattern: &str) -> Result<(String, broadcast::Receiver<Event>), BrokerError> {
        match pattern {
            TOPIC_QUEUE_JOBS => Ok((pattern.to_string(), self.queue_jobs.subscribe())),
            TOPIC_QUEUE_STATS => Ok((pattern.to_string(), self.queue_stats.subscribe())),
            TOPIC_SYSTEM_HEALTH => Ok((pattern.to_string(), self.system_health.subscribe())),
            TOPIC_WORKERS_WILDCARD => Ok((pattern.to_string(), self.workers_wildcard.subscribe())),
            other if parse_worker_status_topic(other).is_some() => {
                let sender = self.per_worker_sender(other);
                Ok((other.to_string(), sender.subscribe()))
            }
            other => Err(BrokerError::UnknownTopic(other.to_string())),
        }
    }

    /// Registers a subscriber against one or more topic patterns and
    /// returns a handle plus the opaque delivery channel (§4.5, §4.6
    /// `subscribe`). Each matched topic gets its own forwarder task reading
    /// an independent `broadcast::Receiver`; a `Lagged(n)` on any of them is
    /// translated into a `"lagged"` marker event rather than propagated as
    /// an error. Uses the broker's configured default buffer size; see
    /// [`Self::subscribe_with_buffer`] for a per-subscription override.
    pub fn subscribe(&self, patterns: &[String]) -> Result<(SubscriptionHandle, EventReceiver), BrokerError> {
        self.subscribe_with_buffer(patterns, self.subscriber_buffer)
    }

    /// Same as [`Self::subscribe`], but with an explicit buffer size instead
    /// of the broker's default (§4.5: "each subscriber has a bounded
    /// in-memory buffer (default 64)" — the default is just that, a
    /// default, not a fixed ceiling). Delivery drops the subscriber's own
    /// *oldest buffered* event on overflow rather than blocking the
    /// forwarder, so a slow subscriber with a small buffer falls behind
    /// independently of the topic's much larger shared broadcast ring.
    pub fn subscribe_with_buffer(&self, patterns: &[String], buffer: usize) -> Result<(SubscriptionHandle, EventReceiver), BrokerError> {
        let mut receivers = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            receivers.push(self.receiver_for(pattern)?);
        }

        let (tx, rx) = channel::bounded(buffer.max(1), receivers.len());
        let cancel = CancellationToken::new();

        for (topic, mut topic_rx) in receivers {
            let tx = tx.clone();
            let cancel = cancel.clone();
            let clock = self.clock.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        result = topic_rx.recv() => {
                            let event = match result {
                                Ok(event) => event,
                                Err(broadcast::error::RecvError::Lagged(skipped)) => Event::lagged(topic.clone(), skipped, clock.epoch_ms()),
                                Err(broadcast::error::RecvError::Closed) => break,
                            };
                            tx.push(event);
                        }
                    }
                }
                tx.mark_done();
            });
        }

        Ok((SubscriptionHandle { cancel }, rx))
    }
}
