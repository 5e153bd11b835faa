// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error cases that don't belong to any single downstream crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("malformed component id: {0:?}")]
    MalformedComponentId(String),

    #[error("malformed worker_kv key: {0:?}")]
    MalformedKvKey(String),
}
