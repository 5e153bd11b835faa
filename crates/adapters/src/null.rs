// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::{AdapterError, TaggingAdapter};
use async_trait::async_trait;
use serde_json::json;

/// Deterministic stub adapter: always succeeds with a fixed tag set. Used
/// for integration tests and as the daemon's default when no real adapter
/// is configured.
#[derive(Debug, Clone, Default)]
pub struct NullAdapter;

#[async_trait]
impl TaggingAdapter for NullAdapter {
    async fn process(&self, path: &str, force: bool) -> Result<serde_json::Value, AdapterError> {
        Ok(json!({ "path": path, "force": force, "tags": ["stub"] }))
    }
}
