// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Table/blob storage backend interface (spec §6 `store`).
//!
//! The run coordination core never touches stored data directly; it only
//! tracks in-flight name reservations. All actual persistence —
//! transactional stage publishing, cache lookups, cache-key computation —
//! is delegated to an implementation of [`Store`]. [`InMemoryStore`] is
//! the reference implementation used by tests and the demo CLI.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod key;
mod memory;

pub use key::compute_cache_key;
pub use memory::InMemoryStore;

use async_trait::async_trait;
use pipedag_core::{BlobRef, CacheError, MaterializedValue, StageId, TableRef, Task};

/// Outcome of materializing a task's return value: the value as the
/// caller sees it, annotated with the artifact references the store
/// assigned while persisting it.
#[derive(Debug, Clone)]
pub struct MaterializedOutput {
    pub value: MaterializedValue,
    pub tables: Vec<TableRef>,
    pub blobs: Vec<BlobRef>,
}

/// Table/blob storage backend.
///
/// Mirrors the original implementation's `table_store`/`PipeDAGStore`
/// surface: `open`/`close` bracket a configuration scope, `setup` runs
/// once per run before any stage is touched, and the remaining methods
/// implement the materialization wrapper's cache/compute/store protocol
/// (spec §4.F).
#[async_trait]
pub trait Store: Send + Sync {
    /// Opens backend resources (DB connections, filesystem handles).
    /// Idempotent under nested calls; see `close`.
    async fn open(&self) -> Result<(), CacheError>;

    /// Closes backend resources opened by `open`. The backend tracks an
    /// internal open-count so nested `open`/`close` pairs only release
    /// resources on the outermost `close`.
    async fn close(&self) -> Result<(), CacheError>;

    /// Run-wide setup performed once, under the lock manager's run-wide
    /// setup lock, before any stage lock is acquired.
    async fn setup(&self) -> Result<(), CacheError>;

    /// Ensures the stage's transactional schema/namespace exists and is
    /// ready to receive materialized artifacts. Called the first time any
    /// task in the stage executes.
    async fn ensure_stage_is_ready(&self, stage: StageId) -> Result<(), CacheError>;

    /// Canonical JSON encoding of a task's bound arguments, fed into
    /// `compute_task_cache_key`.
    fn json_encode(&self, value: &serde_json::Value) -> String;

    /// Computes the cache key for a task given its pre-encoded bound
    /// arguments, its declared version/lazy flag, and its cache function's
    /// current output (omitted when `ignore_fresh_input` is set).
    fn compute_task_cache_key(&self, task: &Task, input_json: &str, ignore_fresh_input: bool) -> String;

    /// Retrieves a previously materialized output for `cache_key` (as
    /// computed by `compute_task_cache_key` from `task`'s current bound
    /// arguments) from a prior run. Fails with `CacheError` on a miss —
    /// callers are expected to catch this and recompute.
    async fn retrieve_cached_output(
        &self,
        task: &Task,
        cache_key: &str,
    ) -> Result<MaterializedOutput, CacheError>;

    /// Copies a cache hit's artifacts into the current run's
    /// transactional stage so downstream tasks can read them.
    async fn copy_cached_output_to_transaction(
        &self,
        output: &MaterializedOutput,
        task: &Task,
    ) -> Result<(), CacheError>;

    /// Resolves `Table`/`Blob` references in a task's bound arguments to
    /// their backing data before the task body runs.
    async fn dematerialize_task_inputs(
        &self,
        task: &Task,
        bound_args: &MaterializedValue,
    ) -> Result<MaterializedValue, CacheError>;

    /// Persists a task's return value under `cache_key` into its stage's
    /// transactional namespace, assigning artifact names for any
    /// `Table`/`Blob` values it contains.
    async fn materialize_task(
        &self,
        task: &Task,
        cache_key: &str,
        result: MaterializedValue,
    ) -> Result<MaterializedOutput, CacheError>;
}
