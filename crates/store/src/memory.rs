// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process reference [`Store`] implementation.
//!
//! Keeps every table/blob in a process-local map instead of talking to a
//! real database or filesystem. Good enough to exercise the run
//! coordination core's full protocol in tests and the demo CLI; a
//! production deployment would implement `Store` against an actual
//! relational engine and object store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use pipedag_core::{BlobRef, CacheError, MaterializedValue, StageId, TableRef, Task};

use crate::key::compute_cache_key;
use crate::{MaterializedOutput, Store};

struct Inner {
    ready_stages: std::collections::HashSet<StageId>,
    /// keyed by (stage, cache_key)
    cache: HashMap<(StageId, String), MaterializedOutput>,
    next_artifact_id: u64,
}

pub struct InMemoryStore {
    inner: Mutex<Inner>,
    open_count: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                ready_stages: std::collections::HashSet::new(),
                cache: HashMap::new(),
                next_artifact_id: 0,
            }),
            open_count: AtomicU64::new(0),
        }
    }

    fn next_artifact_name(&self, prefix: &str) -> String {
        let mut inner = self.inner.lock();
        let id = inner.next_artifact_id;
        inner.next_artifact_id += 1;
        format!("{prefix}_{id}")
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn open(&self) -> Result<(), CacheError> {
        self.open_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), CacheError> {
        self.open_count.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    async fn setup(&self) -> Result<(), CacheError> {
        Ok(())
    }

    async fn ensure_stage_is_ready(&self, stage: StageId) -> Result<(), CacheError> {
        self.inner.lock().ready_stages.insert(stage);
        Ok(())
    }

    fn json_encode(&self, value: &serde_json::Value) -> String {
        value.to_string()
    }

    fn compute_task_cache_key(&self, task: &Task, input_json: &str, ignore_fresh_input: bool) -> String {
        compute_cache_key(task, input_json, ignore_fresh_input)
    }

    async fn retrieve_cached_output(
        &self,
        task: &Task,
        cache_key: &str,
    ) -> Result<MaterializedOutput, CacheError> {
        self.inner
            .lock()
            .cache
            .get(&(task.stage, cache_key.to_string()))
            .cloned()
            .ok_or_else(|| CacheError::new(format!("task:{}", task.id), "no cached output"))
    }

    async fn copy_cached_output_to_transaction(
        &self,
        _output: &MaterializedOutput,
        _task: &Task,
    ) -> Result<(), CacheError> {
        // The reference store keeps one shared cache map rather than
        // distinct cache/transaction namespaces, so a cache hit is already
        // visible to the current run without copying anything.
        Ok(())
    }

    async fn dematerialize_task_inputs(
        &self,
        _task: &Task,
        bound_args: &MaterializedValue,
    ) -> Result<MaterializedValue, CacheError> {
        // Raw/opaque arguments pass through untouched; table/blob
        // references would be resolved to backing data here against a
        // real backend.
        Ok(bound_args.clone())
    }

    async fn materialize_task(
        &self,
        task: &Task,
        cache_key: &str,
        result: MaterializedValue,
    ) -> Result<MaterializedOutput, CacheError> {
        let (tables, blobs) = match &result {
            MaterializedValue::Table(t) => (vec![t.clone()], vec![]),
            MaterializedValue::Blob(b) => (vec![], vec![b.clone()]),
            _ => (vec![], vec![]),
        };
        let value = match result {
            MaterializedValue::Table(_) => {
                MaterializedValue::Table(TableRef::new(self.next_artifact_name("table"), task.stage))
            }
            MaterializedValue::Blob(_) => {
                MaterializedValue::Blob(BlobRef::new(self.next_artifact_name("blob"), task.stage))
            }
            other => other,
        };
        let output = MaterializedOutput { value, tables, blobs };
        self.inner.lock().cache.insert((task.stage, cache_key.to_string()), output.clone());
        Ok(output)
    }
}
