// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RPC requests sent by a worker's client proxy to the run-state server.

use pipedag_core::{FinalTaskState, StageId, TaskId};
use serde::{Deserialize, Serialize};

/// The `cache_keys` passed to the memo operations: a canonical fingerprint
/// of the task's bound arguments plus its declared version, computed by
/// the store.
pub type CacheKey = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Request {
    GetStageRefCount { stage: StageId },
    GetStageState { stage: StageId },

    EnterInitStage { stage: StageId },
    ExitInitStage { stage: StageId, success: bool },
    EnterCommitStage { stage: StageId },
    ExitCommitStage { stage: StageId, success: bool },

    AcquireStageLock { stage: StageId },
    ReleaseStageLock { stage: StageId },
    ValidateStageLock { stage: StageId },

    /// Serializes acquisition of a named, non-stage lock (the original
    /// implementation's `_pipedag_setup_` global), used once at run start
    /// to hold all stage locks under a single mutual-exclusion point
    /// across concurrent flows.
    AcquireNamedLock { name: String },
    ReleaseNamedLock { name: String },

    DidFinishTask { task: TaskId, final_state: FinalTaskState },

    EnterTaskMemo { task: TaskId, cache_keys: Vec<CacheKey> },
    ExitTaskMemo { task: TaskId, cache_keys: Vec<CacheKey>, success: bool },
    StoreTaskMemo { task: TaskId, cache_keys: Vec<CacheKey>, value: pipedag_core::MaterializedValue },

    AddNames { stage: StageId, tables: Vec<String>, blobs: Vec<String> },
    RemoveNames { stage: StageId, tables: Vec<String>, blobs: Vec<String> },

    /// Requests a clean shutdown of the run-state server: it exits its
    /// accept loop and releases every remaining stage lock.
    Shutdown,
}
