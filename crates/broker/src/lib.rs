// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The State Broker (§4.5): a single polling task that diffs Health/Job
//! state against an in-memory snapshot and fans changes out onto per-topic
//! broadcast channels, the way `nomarr-control`'s `subscribe` (§4.6) and
//! eventually an SSE-style HTTP layer consume it.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod broker;
mod channel;
mod error;
mod event;

pub use broker::{Broker, SubscriptionHandle};
pub use channel::EventReceiver;
pub use error::BrokerError;
pub use event::{
    parse_worker_status_topic, worker_status_topic, Event, TOPIC_QUEUE_JOBS, TOPIC_QUEUE_STATS, TOPIC_SYSTEM_HEALTH,
    TOPIC_WORKERS_WILDCARD,
};
