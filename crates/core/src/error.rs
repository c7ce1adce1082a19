// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared by the run-coordination core and its clients.
//!
//! `CacheError` is the only variant callers are expected to catch and
//! recover from (it drives a recompute in the materialization wrapper);
//! everything else propagates.

use thiserror::Error;

use crate::ids::StageId;
use crate::stage::StageState;

/// A stage is in an unexpected lifecycle state.
///
/// Raised out of `init_stage`/`commit_stage` when a peer transition left
/// the stage FAILED, or when the stage never reaches the expected
/// terminal state within the coordinator's timeout.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("stage {stage} is FAILED")]
    Failed { stage: StageId },

    #[error("stage {stage}: expected state {expected}, found {found}")]
    UnexpectedState {
        stage: StageId,
        expected: StageState,
        found: StageState,
    },

    #[error("stage {stage}: timed out waiting for transition to resolve")]
    TransitionTimeout { stage: StageId },

    #[error("stage {stage}: store_task_memo called with no matching WAITING entry (memo key {memo_key:?})")]
    MemoNotClaimed { stage: StageId, memo_key: String },
}

/// A lock is not in the state an operation requires.
///
/// `key` identifies either a stage (`"stage:3"`) or a named, non-stage
/// critical section (`"named:_setup_"`), matching
/// `pipedag_lock::LockKey`'s `Display` impl; the core and wire crates
/// cannot depend on `pipedag-lock` for the concrete type without an
/// import cycle, so the key travels as its rendered form.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("{key}: lock is UNLOCKED")]
    Unlocked { key: String },

    #[error("{key}: lock is INVALID")]
    Invalid { key: String },

    #[error("{key}: timed out acquiring lock")]
    AcquireTimeout { key: String },

    #[error("lock backend error for {key}: {message}")]
    Backend { key: String, message: String },
}

/// The store could not retrieve a previously materialized output.
///
/// Non-fatal: callers are expected to catch this and fall through to
/// recomputing the task.
#[derive(Debug, Error)]
#[error("cache miss for {artifact}: {reason}")]
pub struct CacheError {
    pub artifact: String,
    pub reason: String,
}

impl CacheError {
    pub fn new(artifact: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { artifact: artifact.into(), reason: reason.into() }
    }
}

/// An error value decoded off the wire from a remote peer, opaque beyond
/// its display string and originating kind tag.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    pub kind: String,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self { kind: kind.into(), message: message.into() }
    }
}

/// Wraps an error that occurred inside the run server while handling an
/// RPC, carrying the decoded remote error as its cause.
#[derive(Debug, Error)]
#[error("remote process error handling request: {source}")]
pub struct RemoteProcessError {
    #[source]
    pub source: RemoteError,
}

impl RemoteProcessError {
    pub fn new(source: RemoteError) -> Self {
        Self { source }
    }
}

/// User misuse detected at flow-build time (e.g. a task declared outside
/// any stage). Never raised by the core at run time.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("task {task} was declared outside of any stage")]
    TaskOutsideStage { task: String },

    #[error("stage name {name:?} is used by more than one stage")]
    DuplicateStageName { name: String },

    #[error("flow has no stages")]
    Empty,
}
