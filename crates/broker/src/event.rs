// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event envelope and the closed topic set (§4.5).

use nomarr_core::QueueType;
use serde::{Deserialize, Serialize};

/// A typed record delivered to subscribers: `{type, topic, payload, timestamp}` (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub event_type: String,
    pub topic: String,
    pub payload: serde_json::Value,
    pub timestamp: u64,
}

impl Event {
    pub fn new(event_type: impl Into<String>, topic: impl Into<String>, payload: serde_json::Value, timestamp: u64) -> Self {
        Self { event_type: event_type.into(), topic: topic.into(), payload, timestamp }
    }

    /// Synthetic marker inserted in place of events a slow subscriber missed
    /// (§4.5: "the oldest events are dropped and a `lagged:N` marker is inserted").
    pub fn lagged(topic: impl Into<String>, skipped: u64, timestamp: u64) -> Self {
        Self::new("lagged", topic, serde_json::json!({ "skipped": skipped }), timestamp)
    }
}

pub const TOPIC_QUEUE_JOBS: &str = "queue:jobs";
pub const TOPIC_QUEUE_STATS: &str = "queue:stats";
pub const TOPIC_SYSTEM_HEALTH: &str = "system:health";
pub const TOPIC_WORKERS_WILDCARD: &str = "workers:*";

pub fn worker_status_topic(queue_type: &QueueType, worker_id: u32) -> String {
    format!("worker:{queue_type}:{worker_id}:status")
}

/// Parses a concrete `worker:<queue>:<id>:status` topic string, rejecting
/// anything else (including the wildcard, which is matched separately).
pub fn parse_worker_status_topic(topic: &str) -> Option<(QueueType, u32)> {
    let rest = topic.strip_prefix("worker:")?;
    let rest = rest.strip_suffix(":status")?;
    let (queue, id) = rest.rsplit_once(':')?;
    let id: u32 = id.parse().ok()?;
    Some((QueueType::new(queue), id))
}
