// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `nomarr-daemon`'s library surface: configuration loading, split out of
//! `main.rs` so it can be unit-tested without a running process (teacher
//! pattern: `oj-daemon` keeps a `lib.rs` alongside its `ojd` binary target).

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod config;
mod error;
mod lock;

pub use config::NomarrConfig;
pub use error::DaemonError;
pub use lock::InstanceLock;
