// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier newtypes for jobs, components, and queues.
//!
//! `JobId` is a monotonic counter per §3 ("id (monotonic)"), not a random id —
//! `claim_next` orders on it as a tiebreaker after `created_at`. Components
//! and queue types are names, not surrogate keys, so they stay thin string
//! wrappers rather than nanoid-style ids.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::borrow::Borrow;
use std::fmt;

/// Monotonic job identifier. Allocated by `Queue::enqueue` from a single
/// counter; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// The queue_type tag a job/worker belongs to (e.g. `"tag"`, `"scan"`).
///
/// The core does not interpret this beyond grouping — it is an opaque label
/// used to partition worker pools and topic names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueType(pub SmolStr);

impl QueueType {
    pub fn new(s: impl AsRef<str>) -> Self {
        Self(SmolStr::new(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for QueueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for QueueType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl Borrow<str> for QueueType {
    fn borrow(&self) -> &str {
        self.0.as_str()
    }
}

/// Unique key into the `health` table: either the literal `"app"` or
/// `"worker:<queue>:<id>"` (§3 Health Record).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(pub String);

impl ComponentId {
    /// The parent process's own health row.
    pub fn app() -> Self {
        Self("app".to_string())
    }

    /// A worker process's health row.
    pub fn worker(queue_type: &QueueType, worker_id: u32) -> Self {
        Self(format!("worker:{}:{}", queue_type, worker_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the literal `"app"` component.
    pub fn is_app(&self) -> bool {
        self.0 == "app"
    }

    /// Parse `(queue_type, worker_id)` out of a `"worker:<queue>:<id>"` component,
    /// or `None` for `"app"` or a malformed string.
    pub fn parse_worker(&self) -> Option<(QueueType, u32)> {
        let rest = self.0.strip_prefix("worker:")?;
        let (queue, id) = rest.rsplit_once(':')?;
        let id: u32 = id.parse().ok()?;
        Some((QueueType::new(queue), id))
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ComponentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ComponentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Borrow<str> for ComponentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_worker_round_trips() {
        let queue = QueueType::new("tag");
        let component = ComponentId::worker(&queue, 3);
        assert_eq!(component.as_str(), "worker:tag:3");
        assert_eq!(component.parse_worker(), Some((QueueType::new("tag"), 3)));
    }

    #[test]
    fn component_app_has_no_worker_parse() {
        assert_eq!(ComponentId::app().parse_worker(), None);
        assert!(ComponentId::app().is_app());
    }

    #[test]
    fn queue_type_with_colon_in_suffix_parses_last_segment_as_id() {
        // Degenerate but shouldn't panic: rsplit_once takes the last colon.
        let component = ComponentId::from("worker:a:b:7");
        assert_eq!(component.parse_worker(), Some((QueueType::new("a:b"), 7)));
    }
}
