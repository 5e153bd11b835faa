// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The pluggable `process_fn(path, force) -> tags` seam (spec.md §1: "the ML
//! inference itself ... treated as a pluggable callable").
//!
//! spec.md explicitly keeps inference out of scope, but SPEC_FULL.md §2
//! grounds this crate's existence on the teacher's `AgentAdapter` trait
//! (`oj-adapters`): a real async trait plus at least one concrete in-tree
//! implementation, so the workspace builds and tests end-to-end without
//! pulling in real ML inference code.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod command;
mod null;

pub use command::CommandAdapter;
pub use null::NullAdapter;

use async_trait::async_trait;
use nomarr_core::ExitCode;
use thiserror::Error;

/// Error surfaced by a [`TaggingAdapter`], already classified the way
/// `nomarr-worker`'s main loop needs it: a job-level failure that the worker
/// survives, or a worker-level fatal condition that ends the process (§4.3
/// step (f), §7 taxonomy).
#[derive(Debug, Error)]
pub enum AdapterError {
    /// `process_fn` failed for this job only; the worker keeps running.
    #[error("job failed: {0}")]
    Recoverable(String),

    /// Configuration invalid (e.g. missing model weights); no restart.
    #[error("fatal configuration error: {0}")]
    FatalConfig(String),

    /// Unrecoverable runtime condition (e.g. GPU context lost); no restart.
    #[error("unrecoverable error: {0}")]
    Unrecoverable(String),
}

impl AdapterError {
    /// `None` for [`AdapterError::Recoverable`] — a job-level error does not
    /// end the worker process and has no exit code (§6: exit codes are a
    /// worker-process-level concept).
    pub fn worker_exit_code(&self) -> Option<ExitCode> {
        match self {
            AdapterError::Recoverable(_) => None,
            AdapterError::FatalConfig(_) => Some(ExitCode::FatalConfig),
            AdapterError::Unrecoverable(_) => Some(ExitCode::Unrecoverable),
        }
    }
}

/// The injected callable named throughout the spec as `process_fn(path,
/// force) -> result|error` (§4.3 constructor inputs).
#[async_trait]
pub trait TaggingAdapter: Send + Sync + 'static {
    async fn process(&self, path: &str, force: bool) -> Result<serde_json::Value, AdapterError>;
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// A [`TaggingAdapter`] whose next N results are scripted, for worker
    /// and supervisor tests that need deterministic success/failure
    /// sequences (mirrors the teacher's `test-support`-gated fakes).
    #[derive(Clone, Default)]
    pub struct ScriptedAdapter {
        results: Arc<Mutex<Vec<Result<serde_json::Value, String>>>>,
    }

    impl ScriptedAdapter {
        pub fn new(results: Vec<Result<serde_json::Value, String>>) -> Self {
            Self { results: Arc::new(Mutex::new(results)) }
        }

        /// Every call fails with a recoverable error forever, used by
        /// rapid-failure-lockout tests (S3).
        pub fn always_recoverable_error(message: impl Into<String>) -> Self {
            let message = message.into();
            Self { results: Arc::new(Mutex::new(vec![Err(message)])) }
        }
    }

    #[async_trait]
    impl TaggingAdapter for ScriptedAdapter {
        async fn process(&self, _path: &str, _force: bool) -> Result<serde_json::Value, AdapterError> {
            let mut results = self.results.lock();
            let next = if results.len() > 1 { results.remove(0) } else { results[0].clone() };
            next.map_err(AdapterError::Recoverable)
        }
    }
}
