// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-subscriber delivery channel (§4.5): "each subscriber has a
//! bounded in-memory buffer... When full, the oldest events are dropped and
//! a `lagged:N` marker is inserted."
//!
//! `tokio::sync::mpsc` can't express this directly — a full mpsc channel
//! makes the sender wait rather than evict the oldest entry, which only
//! matches spec's drop-oldest contract once a slow subscriber falls behind
//! the *topic*'s broadcast ring too (a much larger, shared buffer). This is
//! a small dedicated ring so a subscriber's own small buffer enforces the
//! drop directly, independent of how many other subscribers are attached to
//! the same topic.

use crate::event::Event;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

struct State {
    queue: VecDeque<Event>,
    /// Per-topic count of events evicted to make room, with the timestamp
    /// of the most recent eviction — surfaced as a `lagged` marker the next
    /// time the receiver drains this topic.
    dropped_by_topic: HashMap<String, (u64, u64)>,
}

struct Shared {
    state: Mutex<State>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
    active_senders: AtomicUsize,
}

/// A handle that pushes events into the shared ring. Cloned once per
/// forwarder task (one per matched topic pattern in a subscription).
#[derive(Clone)]
pub struct EventSender {
    shared: Arc<Shared>,
}

/// The subscriber-facing half. One per subscription, returned to the caller
/// of [`crate::Broker::subscribe`].
pub struct EventReceiver {
    shared: Arc<Shared>,
}

/// Creates a bounded, lossy, drop-oldest channel fed by `sender_count`
/// independent forwarder tasks.
pub fn bounded(capacity: usize, sender_count: usize) -> (EventSender, EventReceiver) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State { queue: VecDeque::new(), dropped_by_topic: HashMap::new() }),
        capacity: capacity.max(1),
        notify: Notify::new(),
        closed: AtomicBool::new(sender_count == 0),
        active_senders: AtomicUsize::new(sender_count),
    });
    (EventSender { shared: shared.clone() }, EventReceiver { shared })
}

impl EventSender {
    /// Pushes `event`, evicting the oldest buffered event (and recording the
    /// drop against its topic) if the channel is already at capacity.
    pub fn push(&self, event: Event) {
        let mut state = self.shared.state.lock();
        if state.queue.len() >= self.shared.capacity {
            if let Some(evicted) = state.queue.pop_front() {
                let entry = state.dropped_by_topic.entry(evicted.topic).or_insert((0, 0));
                entry.0 += 1;
                entry.1 = evicted.timestamp;
            }
        }
        state.queue.push_back(event);
        drop(state);
        self.shared.notify.notify_waiters();
    }

    /// Called by a forwarder task once its upstream topic subscription ends
    /// (cancellation or the topic's broadcast sender closing). Once every
    /// forwarder for this subscription has called this, the receiver is
    /// marked closed so a draining `recv` can return `None` instead of
    /// waiting forever.
    pub fn mark_done(&self) {
        if self.shared.active_senders.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.shared.closed.store(true, Ordering::SeqCst);
            self.shared.notify.notify_waiters();
        }
    }
}

impl EventReceiver {
    /// Awaits the next event, surfacing any pending `lagged` marker first.
    /// Returns `None` once every forwarder has finished and the buffer is
    /// drained (§4.5 Cancellation: safe to call after unsubscribing).
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            if let Some(event) = self.poll_once() {
                return Some(event);
            }
            if self.shared.closed.load(Ordering::SeqCst) {
                // One last check: a push could have landed between the
                // empty-check above and the closed-check here.
                return self.poll_once();
            }
            self.shared.notify.notified().await;
        }
    }

    /// Non-blocking poll, mirroring `tokio::sync::mpsc::Receiver::try_recv`.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.poll_once()
    }

    fn poll_once(&mut self) -> Option<Event> {
        let mut state = self.shared.state.lock();
        if let Some(topic) = state.dropped_by_topic.keys().next().cloned() {
            let (count, timestamp) = state.dropped_by_topic.remove(&topic).unwrap();
            return Some(Event::lagged(topic, count, timestamp));
        }
        state.queue.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn overflow_evicts_oldest_and_surfaces_a_lagged_marker() {
        let (tx, mut rx) = bounded(2, 1);
        tx.push(Event::new("state_change", "queue:jobs", serde_json::json!(1), 1));
        tx.push(Event::new("state_change", "queue:jobs", serde_json::json!(2), 2));
        tx.push(Event::new("state_change", "queue:jobs", serde_json::json!(3), 3));

        // Event 1 was evicted to make room for event 3; the lagged marker
        // surfaces before the remaining buffered events.
        let lagged = rx.try_recv().unwrap();
        assert_eq!(lagged.event_type, "lagged");
        assert_eq!(lagged.payload["skipped"], 1);

        let second = rx.try_recv().unwrap();
        assert_eq!(second.payload, serde_json::json!(2));
        let third = rx.try_recv().unwrap();
        assert_eq!(third.payload, serde_json::json!(3));
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn recv_returns_none_once_every_sender_is_done_and_drained() {
        let (tx, mut rx) = bounded(4, 1);
        tx.push(Event::new("state_change", "queue:jobs", serde_json::json!(1), 1));
        tx.mark_done();

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn multiple_senders_keep_the_channel_open_until_all_finish() {
        let (tx, mut rx) = bounded(4, 2);
        let tx2 = tx.clone();
        tx.mark_done();
        assert!(!rx.shared.closed.load(Ordering::SeqCst));
        tx2.mark_done();
        assert!(rx.shared.closed.load(Ordering::SeqCst));
    }
}
