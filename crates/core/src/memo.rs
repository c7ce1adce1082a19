// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Memoization table entries.
//!
//! `memo_key = (stage_id, canonical_cache_input_fingerprint)`; an entry
//! starts absent (`None`), moves to `Waiting` while the first caller
//! computes it, and resolves to either `Done` (with the materialized
//! result available to waiters) or `Failed` (propagated to every waiter).

use serde::{Deserialize, Serialize};

use crate::value::MaterializedValue;

/// Discriminant-only view of a memo entry, as carried on the wire
/// (spec: `{0:NONE, 1:WAITING, 127:FAILED}`, plus a non-wire `Done`
/// variant the server substitutes with the stored value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MemoState {
    None = 0,
    Waiting = 1,
    Failed = 127,
}

impl MemoState {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// A memo table entry as held by the run-state server.
#[derive(Debug, Clone)]
pub enum MemoEntry {
    Waiting,
    Failed,
    Done(MaterializedValue),
}

impl MemoEntry {
    pub fn state(&self) -> MemoState {
        match self {
            MemoEntry::Waiting => MemoState::Waiting,
            MemoEntry::Failed => MemoState::Failed,
            MemoEntry::Done(_) => MemoState::None,
        }
    }
}
