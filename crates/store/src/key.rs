// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cache-key computation.
//!
//! A task's cache key is a hash of its owning stage, its declared version
//! (or `"lazy"` if it opts out of version bumps), the canonical JSON
//! encoding of its bound arguments, and its cache function's output (unless
//! the run asked to ignore fresh input). Two calls with the same key are
//! treated as identical invocations by the memoization table.

use sha2::{Digest, Sha256};

use pipedag_core::Task;

/// Computes a cache key as used by [`crate::Store::compute_task_cache_key`].
///
/// `ignore_fresh_input` drops the task's `cache_fn` output from the hash,
/// so two runs that only differ in what that function currently returns
/// produce the same key (spec's `ignore_fresh_input` re-run suppression).
pub fn compute_cache_key(task: &Task, input_json: &str, ignore_fresh_input: bool) -> String {
    let mut hasher = Sha256::new();
    hasher.update(task.stage.to_string().as_bytes());
    hasher.update(b"\0");
    match &task.cache_policy.version {
        Some(version) if !task.cache_policy.lazy => hasher.update(version.as_bytes()),
        _ => hasher.update(b"lazy"),
    }
    hasher.update(b"\0");
    hasher.update(input_json.as_bytes());
    hasher.update(b"\0");
    if !ignore_fresh_input {
        if let Some(cache_fn) = &task.cache_policy.cache_fn {
            hasher.update(cache_fn().to_string().as_bytes());
        }
    }
    format!("{:x}", hasher.finalize())
}
