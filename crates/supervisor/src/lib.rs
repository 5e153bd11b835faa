// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Worker Supervisor (§4.4): spawns and monitors the `nmr-worker` OS
//! processes, applies the restart policy on death, and owns pause/resume
//! and graceful shutdown for the process tree it manages.
//!
//! Generic over [`nomarr_storage::Storage`] and [`nomarr_core::Clock`], the
//! same shape used throughout the workspace so unit tests run against
//! `MemStorage` + `FakeClock` with a scripted [`process::ProcessLauncher`]
//! instead of forking real processes.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod config;
mod error;
mod process;
mod restart;
mod supervisor;

pub use config::SupervisorConfig;
pub use error::SupervisorError;
pub use process::{worker_args, CommandLauncher, ProcessLauncher, WorkerExit};
pub use restart::{RestartDecision, RestartTracker};
pub use supervisor::Supervisor;

#[cfg(any(test, feature = "test-support"))]
pub use process::test_support;
