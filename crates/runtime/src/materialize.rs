// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialization wrapper (spec §4.F): the per-task-call decision
//! between returning a memoized value, waiting on a concurrent identical
//! call, loading from the cache, or dematerializing inputs and running
//! the task body.

use std::sync::Arc;

use pipedag_core::{CacheError, MaterializedValue, StageError, Task};
use pipedag_store::Store;

use crate::client::RunClient;
use crate::lifecycle::init_stage;

/// Wraps a task's user function with the cache/memo protocol. `compute`
/// runs the task body against dematerialized inputs and returns its raw
/// result; it is only invoked on a cache miss.
pub struct MaterializationWrapper {
    client: Arc<RunClient>,
    store: Arc<dyn Store>,
    ignore_fresh_input: bool,
}

impl MaterializationWrapper {
    pub fn new(client: Arc<RunClient>, store: Arc<dyn Store>, ignore_fresh_input: bool) -> Self {
        Self { client, store, ignore_fresh_input }
    }

    /// Runs the full materialization protocol for one invocation of
    /// `task` with already-bound arguments, calling `compute` only when
    /// neither the memo table nor the cache has a usable result.
    pub async fn call<F, Fut>(
        &self,
        task: &Task,
        bound_args: MaterializedValue,
        compute: F,
    ) -> Result<MaterializedValue, StageError>
    where
        F: FnOnce(MaterializedValue) -> Fut,
        Fut: std::future::Future<Output = MaterializedValue>,
    {
        self.ensure_stage_ready(task.stage).await?;

        let input_json = self.store.json_encode(&to_json(&bound_args));
        let cache_key = self.store.compute_task_cache_key(task, &input_json, self.ignore_fresh_input);

        let lookup = self
            .client
            .enter_task_memo(task.id, vec![cache_key.clone()])
            .await
            .map_err(|_| StageError::Failed { stage: task.stage })?;

        if lookup.hit {
            if let Some(value) = lookup.value {
                return Ok(semi_deep_copy(&value));
            }
        }

        let result = self.resolve_or_compute(task, &cache_key, bound_args, compute).await;

        match result {
            Ok(value) => {
                let _ = self.client.exit_task_memo(task.id, vec![cache_key], true).await;
                Ok(value)
            }
            Err(e) => {
                let _ = self.client.exit_task_memo(task.id, vec![cache_key], false).await;
                Err(e)
            }
        }
    }

    /// Ensures `stage` has been initialized exactly once across however
    /// many workers race to be the first to touch it, via the stage
    /// lifecycle coordinator's init transition.
    async fn ensure_stage_ready(&self, stage: pipedag_core::StageId) -> Result<(), StageError> {
        let store = &self.store;
        init_stage(&self.client, stage, |should_execute| async move {
            if should_execute {
                store
                    .ensure_stage_is_ready(stage)
                    .await
                    .map_err(|_| StageError::Failed { stage })?;
            }
            Ok(())
        })
        .await
    }

    async fn resolve_or_compute<F, Fut>(
        &self,
        task: &Task,
        cache_key: &str,
        bound_args: MaterializedValue,
        compute: F,
    ) -> Result<MaterializedValue, StageError>
    where
        F: FnOnce(MaterializedValue) -> Fut,
        Fut: std::future::Future<Output = MaterializedValue>,
    {
        if !task.cache_policy.lazy {
            if let Ok(cached) = self.store.retrieve_cached_output(task, cache_key).await {
                self.store
                    .copy_cached_output_to_transaction(&cached, task)
                    .await
                    .map_err(cache_to_stage(task))?;
                self.store_memo(task, cache_key, cached.value.clone()).await?;
                return Ok(cached.value);
            }
        }

        let dematerialized = self
            .store
            .dematerialize_task_inputs(task, &bound_args)
            .await
            .map_err(cache_to_stage(task))?;

        let raw_result = compute(dematerialized).await;

        let materialized = self
            .store
            .materialize_task(task, cache_key, raw_result)
            .await
            .map_err(cache_to_stage(task))?;

        self.store_memo(task, cache_key, materialized.value.clone()).await?;
        Ok(materialized.value)
    }

    async fn store_memo(
        &self,
        task: &Task,
        cache_key: &str,
        value: MaterializedValue,
    ) -> Result<(), StageError> {
        self.client
            .store_task_memo(task.id, vec![cache_key.to_string()], value)
            .await
            .map_err(|_| StageError::Failed { stage: task.stage })
    }
}

fn cache_to_stage(task: &Task) -> impl FnOnce(CacheError) -> StageError + '_ {
    move |_e| StageError::Failed { stage: task.stage }
}

fn to_json(value: &MaterializedValue) -> serde_json::Value {
    match value {
        MaterializedValue::Raw(v) => v.clone(),
        MaterializedValue::Table(t) => serde_json::json!({"table": t.name, "stage": t.stage.index()}),
        MaterializedValue::Blob(b) => serde_json::json!({"blob": b.name, "stage": b.stage.index()}),
        MaterializedValue::Opaque(bytes) => serde_json::json!({"opaque_len": bytes.len()}),
    }
}

/// Deep-copies container values (so concurrent callers can't observe each
/// other's mutations), but shallow-copies leaf artifact references —
/// mirroring the original implementation's `deepmutate(memo_result,
/// copy.copy)`. `Table`/`Blob`/`Opaque` values are immutable handles in
/// this port, so "shallow copy" and "deep copy" coincide for them; the
/// distinction only matters for `Raw` JSON containers.
pub fn semi_deep_copy(value: &MaterializedValue) -> MaterializedValue {
    match value {
        MaterializedValue::Raw(json) => MaterializedValue::Raw(deep_copy_json(json)),
        other => other.clone(),
    }
}

fn deep_copy_json(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(deep_copy_json).collect())
        }
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter().map(|(k, v)| (k.clone(), deep_copy_json(v))).collect(),
        ),
        leaf => leaf.clone(),
    }
}

#[cfg(test)]
#[path = "materialize_tests.rs"]
mod tests;
