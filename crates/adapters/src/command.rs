// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Adapter that shells out to an external `process(path)` program, for
//! operators who implement tagging in another language/runtime. Grounded on
//! the teacher's subprocess-adapter pattern (`oj-adapters`'s coop spawn:
//! build a `Command`, run it to completion, interpret its exit status).

use crate::{AdapterError, TaggingAdapter};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::warn;

/// Invokes `<program> <path> [--force]` and parses its stdout as the job
/// result JSON. The child's own exit code is read through the same
/// convention as a worker process's (§6): `0` ok, `1` recoverable, `2`
/// fatal config, `3` unrecoverable; anything else is treated as recoverable
/// so a misbehaving external program degrades to per-job failures rather
/// than taking the whole worker down.
#[derive(Debug, Clone)]
pub struct CommandAdapter {
    program: String,
    extra_args: Vec<String>,
}

impl CommandAdapter {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), extra_args: Vec::new() }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.extra_args = args.into_iter().collect();
        self
    }
}

#[async_trait]
impl TaggingAdapter for CommandAdapter {
    async fn process(&self, path: &str, force: bool) -> Result<serde_json::Value, AdapterError> {
        let mut command = Command::new(&self.program);
        command.args(&self.extra_args).arg(path).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
        if force {
            command.arg("--force");
        }

        let output = command
            .output()
            .await
            .map_err(|err| AdapterError::FatalConfig(format!("failed to spawn {}: {err}", self.program)))?;

        match output.status.code() {
            Some(0) => serde_json::from_slice(&output.stdout)
                .map_err(|err| AdapterError::Recoverable(format!("malformed adapter output: {err}"))),
            Some(2) => Err(AdapterError::FatalConfig(stderr_tail(&output.stderr))),
            Some(3) => Err(AdapterError::Unrecoverable(stderr_tail(&output.stderr))),
            Some(code) => {
                warn!(code, program = %self.program, "adapter exited with unrecognized code, treating as recoverable");
                Err(AdapterError::Recoverable(stderr_tail(&output.stderr)))
            }
            None => Err(AdapterError::Recoverable(format!("{} terminated by signal", self.program))),
        }
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr).trim().to_string()
}
