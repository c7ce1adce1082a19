// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authoritative per-run state server (spec §4.C).
//!
//! Tracks stage lifecycle state, reference counts, the memo table, and
//! per-stage artifact name sets for a single run, and serves RPC requests
//! from worker client proxies (see [`crate::listener`]).

use std::sync::Arc;
use std::time::Duration;

use pipedag_core::{
    Flow, LockError, LockState, MemoEntry, RunId, StageError, StageId, StageState, TaskId,
};
use pipedag_lock::{LockKey, LockManager};
use pipedag_wire::{MemoLookup, NameReservation, Request, Response, WireError};
use tracing::{debug, error, warn};

use crate::state::{join_cache_keys, MemoTable, NameTable, RefCountTable, StageStateTable};

/// Sub-100ms quantum for the stage-transition spin wait and memo wait,
/// matching the original implementation's `time.sleep(0.01)`.
const SPIN_QUANTUM: Duration = Duration::from_millis(10);

pub struct RunServer {
    pub flow: Flow,
    pub run_id: RunId,
    pub ignore_fresh_input: bool,

    state: StageStateTable,
    ref_count: RefCountTable,
    names: NameTable,
    memo: MemoTable,

    lock_manager: Arc<dyn LockManager>,
}

impl RunServer {
    pub fn new(flow: Flow, lock_manager: Arc<dyn LockManager>, ignore_fresh_input: bool) -> Self {
        let num_stages = flow.stages.len();
        let initial_ref_counts = flow
            .stages
            .iter()
            .map(|s| flow.initial_ref_count(s.id) as i64)
            .collect();

        lock_manager.add_listener(Box::new(|key, old, new| match new {
            LockState::Uncertain => {
                warn!(%key, ?old, "lock state transition to UNCERTAIN");
            }
            LockState::Locked | LockState::Invalid if old == LockState::Uncertain => {
                debug!(%key, ?new, "lock state resolved from UNCERTAIN");
            }
            _ => {
                debug!(%key, ?old, ?new, "lock state transition");
            }
        }));

        Self {
            state: StageStateTable::new(num_stages),
            ref_count: RefCountTable::new(initial_ref_counts),
            names: NameTable::new(num_stages),
            memo: MemoTable::new(),
            lock_manager,
            run_id: RunId::new(),
            ignore_fresh_input,
            flow,
        }
    }

    /// Acquires the run-wide setup lock, then every stage lock, in a
    /// single critical section — preventing two concurrent runs from
    /// deadlocking each other via lock-order inversion across their
    /// stage sets (spec's "initialization lock-order invariant").
    pub async fn acquire_all_stage_locks(&self) -> Result<(), LockError> {
        self.lock_manager.acquire(LockKey::Named("_pipedag_setup_".into())).await?;
        for stage in &self.flow.stages {
            self.lock_manager.acquire(LockKey::Stage(stage.id)).await?;
        }
        self.lock_manager.release(LockKey::Named("_pipedag_setup_".into())).await?;
        Ok(())
    }

    pub async fn release_all_locks(&self) {
        if let Err(e) = self.lock_manager.release_all().await {
            error!(error = %e, "failed to release all locks during shutdown");
        }
    }

    pub async fn handle_request(&self, request: Request) -> Response {
        match self.dispatch(request).await {
            Ok(response) => response,
            Err(wire) => Response::Err(wire),
        }
    }

    async fn dispatch(&self, request: Request) -> Result<Response, WireError> {
        match request {
            Request::GetStageRefCount { stage } => {
                Ok(Response::RefCount(self.ref_count.get(stage) as u64))
            }
            Request::GetStageState { stage } => Ok(Response::StageState(self.state.get(stage))),

            Request::EnterInitStage { stage } => {
                let can_continue = self
                    .enter_stage_transition(
                        stage,
                        StageState::Uninitialized,
                        StageState::Initializing,
                        StageState::Ready,
                    )
                    .await
                    .map_err(wire_error)?;
                Ok(Response::Bool(can_continue))
            }
            Request::ExitInitStage { stage, success } => {
                self.exit_stage_transition(stage, success, StageState::Initializing, StageState::Ready)
                    .map_err(wire_error)?;
                Ok(Response::Ok)
            }
            Request::EnterCommitStage { stage } => {
                let can_continue = self
                    .enter_stage_transition(
                        stage,
                        StageState::Ready,
                        StageState::Committing,
                        StageState::Committed,
                    )
                    .await
                    .map_err(wire_error)?;
                Ok(Response::Bool(can_continue))
            }
            Request::ExitCommitStage { stage, success } => {
                self.exit_stage_transition(stage, success, StageState::Committing, StageState::Committed)
                    .map_err(wire_error)?;
                Ok(Response::Ok)
            }

            Request::AcquireStageLock { stage } => {
                self.lock_manager.acquire(LockKey::Stage(stage)).await.map_err(lock_wire_error)?;
                Ok(Response::Ok)
            }
            Request::ReleaseStageLock { stage } => {
                self.lock_manager.release(LockKey::Stage(stage)).await.map_err(lock_wire_error)?;
                Ok(Response::Ok)
            }
            Request::ValidateStageLock { stage } => {
                self.lock_manager.validate(&LockKey::Stage(stage)).await.map_err(lock_wire_error)?;
                Ok(Response::Ok)
            }

            Request::AcquireNamedLock { name } => {
                self.lock_manager.acquire(LockKey::Named(name)).await.map_err(lock_wire_error)?;
                Ok(Response::Ok)
            }
            Request::ReleaseNamedLock { name } => {
                self.lock_manager.release(LockKey::Named(name)).await.map_err(lock_wire_error)?;
                Ok(Response::Ok)
            }

            Request::DidFinishTask { task, final_state } => {
                self.did_finish_task(task, final_state).await;
                Ok(Response::Ok)
            }

            Request::EnterTaskMemo { task, cache_keys } => {
                let lookup = self.enter_task_memo(task, cache_keys).await.map_err(wire_error)?;
                Ok(Response::MemoLookup(lookup))
            }
            Request::ExitTaskMemo { task, cache_keys, success } => {
                self.exit_task_memo(task, cache_keys, success);
                Ok(Response::Ok)
            }
            Request::StoreTaskMemo { task, cache_keys, value } => {
                self.store_task_memo(task, cache_keys, value).map_err(wire_error)?;
                Ok(Response::Ok)
            }

            Request::AddNames { stage, tables, blobs } => {
                Ok(Response::NameReservation(self.add_names(stage, tables, blobs)))
            }
            Request::RemoveNames { stage, tables, blobs } => {
                self.remove_names(stage, tables, blobs);
                Ok(Response::Ok)
            }

            Request::Shutdown => Ok(Response::Ok),
        }
    }

    /// Implements the stage-transition algorithm from spec §4.C: try to
    /// claim the transition under the state lock; if another caller owns
    /// it, spin-wait (releasing the lock while waiting) until it
    /// resolves.
    async fn enter_stage_transition(
        &self,
        stage: StageId,
        from: StageState,
        transitional: StageState,
        to: StageState,
    ) -> Result<bool, StageError> {
        let claimed = self.state.with_lock(|states| {
            if states[stage.index()] == to {
                return Some(false);
            }
            if states[stage.index()] == from {
                states[stage.index()] = transitional;
                return Some(true);
            }
            None
        });
        if let Some(result) = claimed {
            return Ok(result);
        }

        loop {
            if self.state.get(stage) != transitional {
                break;
            }
            tokio::time::sleep(SPIN_QUANTUM).await;
        }

        let state = self.state.get(stage);
        if state == to {
            return Ok(false);
        }
        if state == StageState::Failed {
            return Err(StageError::Failed { stage });
        }
        Ok(false)
    }

    fn exit_stage_transition(
        &self,
        stage: StageId,
        success: bool,
        transitional: StageState,
        to: StageState,
    ) -> Result<(), StageError> {
        if !success {
            self.state.with_lock(|states| states[stage.index()] = StageState::Failed);
            return Ok(());
        }
        self.state.with_lock(|states| {
            if states[stage.index()] == transitional {
                states[stage.index()] = to;
                Ok(())
            } else {
                Err(StageError::UnexpectedState { stage, expected: transitional, found: states[stage.index()] })
            }
        })
    }

    /// Decrements the ref count of every upstream stage of `task`,
    /// releasing locks for any stage whose count reaches zero *after*
    /// dropping the ref-count lock, so the lock manager is never invoked
    /// while a core mutex is held.
    async fn did_finish_task(&self, task: TaskId, _final_state: pipedag_core::FinalTaskState) {
        let Some(task) = self.flow.task(task).cloned() else {
            warn!(?task, "did_finish_task: unknown task id");
            return;
        };

        let stages_to_release = self.ref_count.with_lock(|counts| {
            let mut release = Vec::new();
            for stage in &task.upstream_stages {
                let idx = stage.index();
                counts[idx] -= 1;
                let rc = counts[idx];
                if rc == 0 {
                    release.push(*stage);
                } else if rc < 0 {
                    error!(stage = %stage, reference_count = rc, "reference counter is negative");
                }
            }
            release
        });

        for stage in stages_to_release {
            if let Err(e) = self.lock_manager.release(LockKey::Stage(stage)).await {
                error!(stage = %stage, error = %e, "failed to release stage lock after ref count reached zero");
            }
        }
    }

    async fn enter_task_memo(
        &self,
        task_id: TaskId,
        cache_keys: Vec<String>,
    ) -> Result<MemoLookup, StageError> {
        let Some(task) = self.flow.task(task_id) else {
            return Ok(MemoLookup { hit: false, value: None });
        };
        let memo_key = (task.stage, join_cache_keys(&cache_keys));

        let claimed_waiting = self.memo.with_lock(|entries| {
            if !entries.contains_key(&memo_key) {
                entries.insert(memo_key.clone(), MemoEntry::Waiting);
                true
            } else {
                false
            }
        });
        if claimed_waiting {
            return Ok(MemoLookup { hit: false, value: None });
        }

        debug!(task = %task_id, "waiting for concurrent invocation with identical inputs");
        loop {
            let snapshot = self.memo.with_lock(|entries| entries.get(&memo_key).cloned());
            match snapshot {
                Some(MemoEntry::Waiting) => {
                    tokio::time::sleep(SPIN_QUANTUM).await;
                }
                Some(MemoEntry::Failed) => {
                    return Err(StageError::Failed { stage: task.stage });
                }
                Some(MemoEntry::Done(value)) => {
                    return Ok(MemoLookup { hit: true, value: Some(value) });
                }
                None => return Ok(MemoLookup { hit: false, value: None }),
            }
        }
    }

    fn exit_task_memo(&self, task_id: TaskId, cache_keys: Vec<String>, success: bool) {
        let Some(task) = self.flow.task(task_id) else { return };
        let memo_key = (task.stage, join_cache_keys(&cache_keys));
        if !success {
            self.memo.with_lock(|entries| entries.insert(memo_key, MemoEntry::Failed));
        }
    }

    fn store_task_memo(
        &self,
        task_id: TaskId,
        cache_keys: Vec<String>,
        value: pipedag_core::MaterializedValue,
    ) -> Result<(), StageError> {
        let Some(task) = self.flow.task(task_id) else {
            return Ok(());
        };
        let memo_key = (task.stage, join_cache_keys(&cache_keys));
        self.memo.with_lock(|entries| match entries.get(&memo_key) {
            Some(MemoEntry::Waiting) => {
                entries.insert(memo_key.clone(), MemoEntry::Done(value));
                Ok(())
            }
            _ => Err(StageError::MemoNotClaimed { stage: task.stage, memo_key: memo_key.1 }),
        })
    }

    fn add_names(&self, stage: StageId, tables: Vec<String>, blobs: Vec<String>) -> NameReservation {
        self.names.with_lock(|names| {
            let entry = &mut names[stage.index()];
            let table_duplicates: Vec<String> =
                tables.iter().filter(|t| entry.tables.contains(*t)).cloned().collect();
            let blob_duplicates: Vec<String> =
                blobs.iter().filter(|b| entry.blobs.contains(*b)).cloned().collect();

            if !table_duplicates.is_empty() || !blob_duplicates.is_empty() {
                return NameReservation { success: false, table_duplicates, blob_duplicates };
            }

            for table in tables {
                entry.tables.insert(table);
            }
            for blob in blobs {
                entry.blobs.insert(blob);
            }
            NameReservation { success: true, table_duplicates: vec![], blob_duplicates: vec![] }
        })
    }

    fn remove_names(&self, stage: StageId, tables: Vec<String>, blobs: Vec<String>) {
        self.names.with_lock(|names| {
            let entry = &mut names[stage.index()];
            for table in tables {
                entry.tables.remove(&table);
            }
            for blob in blobs {
                entry.blobs.remove(&blob);
            }
        });
    }
}

fn wire_error(err: StageError) -> WireError {
    WireError { kind: "StageError".to_string(), message: err.to_string() }
}

fn lock_wire_error(err: LockError) -> WireError {
    WireError { kind: "LockError".to_string(), message: err.to_string() }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
