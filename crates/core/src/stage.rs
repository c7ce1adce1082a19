// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stage identity and lifecycle state.

use serde::{Deserialize, Serialize};

use crate::ids::StageId;

/// A logical grouping of tasks whose outputs are published atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub id: StageId,
    pub name: String,
    /// Name used for the staging/transactional copy of this stage's
    /// artifacts while a run is in flight.
    pub transaction_name: String,
}

impl Stage {
    pub fn new(id: StageId, name: impl Into<String>) -> Self {
        let name = name.into();
        let transaction_name = format!("{name}__odd");
        Self { id, name, transaction_name }
    }
}

/// Lifecycle state of a stage within a single run.
///
/// Transitions follow `Uninitialized -> Initializing -> Ready ->
/// Committing -> Committed`; any state may move to `Failed`, which is
/// terminal for the remainder of the run. Only one participant may hold a
/// transitional state (`Initializing`, `Committing`) at a time — others
/// block until it resolves.
///
/// The numeric values match the wire encoding used by [`pipedag_wire`]'s
/// `Request`/`Response` payloads (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum StageState {
    Uninitialized = 0,
    Initializing = 1,
    Ready = 2,
    Committing = 3,
    Committed = 4,
    Failed = 127,
}

impl StageState {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_transitional(self) -> bool {
        matches!(self, StageState::Initializing | StageState::Committing)
    }
}

impl std::fmt::Display for StageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StageState::Uninitialized => "UNINITIALIZED",
            StageState::Initializing => "INITIALIZING",
            StageState::Ready => "READY",
            StageState::Committing => "COMMITTING",
            StageState::Committed => "COMMITTED",
            StageState::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
#[path = "stage_tests.rs"]
mod tests;
