// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RPC responses returned by the run-state server.

use pipedag_core::{MaterializedValue, StageState};
use serde::{Deserialize, Serialize};

/// Decoded counterpart of an exception raised while the server handled a
/// request. The client wraps this in `pipedag_core::RemoteProcessError`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub kind: String,
    pub message: String,
}

impl From<WireError> for pipedag_core::RemoteError {
    fn from(e: WireError) -> Self {
        pipedag_core::RemoteError::new(e.kind, e.message)
    }
}

impl From<pipedag_core::RemoteError> for WireError {
    fn from(e: pipedag_core::RemoteError) -> Self {
        WireError { kind: e.kind, message: e.message }
    }
}

/// Result of `add_names`/`remove_names`: all-or-nothing, with whichever
/// names already existed reported back so the caller can raise a precise
/// error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NameReservation {
    pub success: bool,
    pub table_duplicates: Vec<String>,
    pub blob_duplicates: Vec<String>,
}

/// Result of `enter_task_memo`: either a cache hit with its stored value,
/// or a miss the caller must compute (and later report via
/// `store_task_memo`/`exit_task_memo`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoLookup {
    pub hit: bool,
    pub value: Option<MaterializedValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Ok,
    Bool(bool),
    RefCount(u64),
    StageState(StageState),
    NameReservation(NameReservation),
    MemoLookup(MemoLookup),
    Err(WireError),
}

impl Response {
    pub fn is_err(&self) -> bool {
        matches!(self, Response::Err(_))
    }
}
