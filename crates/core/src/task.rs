// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task identity and cache policy.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ids::{StageId, TaskId};

/// A user-supplied callable whose return value represents a task's
/// "fresh input" (a file's mtime, a row count, an external API response),
/// data the task's cache key must fold in so a cache hit can be
/// invalidated by a change the backend itself cannot see. Re-evaluated on
/// every call; see `ignore_fresh_input` for suppressing its contribution.
pub type CacheFn = Arc<dyn Fn() -> serde_json::Value + Send + Sync>;

/// Caching behavior declared by a task at flow-build time.
///
/// `version` must be bumped whenever the task's implementation changes in a
/// way that should invalidate a previously cached result; a `lazy` task is
/// exempt (its body always runs, so the backend can instead compare the
/// query it produces). `cache_fn`, when set, contributes its own output to
/// the cache key alongside `version` (spec's cache-key formula); a run with
/// `ignore_fresh_input` set omits that contribution.
#[derive(Clone, Default)]
pub struct CachePolicy {
    pub lazy: bool,
    pub version: Option<String>,
    pub cache_fn: Option<CacheFn>,
}

impl std::fmt::Debug for CachePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachePolicy")
            .field("lazy", &self.lazy)
            .field("version", &self.version)
            .field("cache_fn", &self.cache_fn.is_some())
            .finish()
    }
}

impl CachePolicy {
    pub fn lazy() -> Self {
        Self { lazy: true, version: None, cache_fn: None }
    }

    pub fn versioned(version: impl Into<String>) -> Self {
        Self { lazy: false, version: Some(version.into()), cache_fn: None }
    }

    /// Attaches a cache function whose output feeds into the cache key
    /// (dropped from the hash when a run sets `ignore_fresh_input`).
    pub fn with_cache_fn(mut self, cache_fn: CacheFn) -> Self {
        self.cache_fn = Some(cache_fn);
        self
    }
}

/// A unit of computation belonging to exactly one stage, with declared
/// upstream stages whose artifacts it reads.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub stage: StageId,
    pub upstream_stages: Vec<StageId>,
    pub cache_policy: CachePolicy,
}

impl Task {
    pub fn new(id: TaskId, stage: StageId, upstream_stages: Vec<StageId>) -> Self {
        Self { id, stage, upstream_stages, cache_policy: CachePolicy::default() }
    }

    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }
}

/// Terminal outcome of a task's single execution, reported to the
/// run-state server via `did_finish_task` so it can release reference
/// counts on the task's upstream stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FinalTaskState {
    Unknown = 0,
    Completed = 1,
    Failed = 2,
    Skipped = 3,
}

impl FinalTaskState {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}
