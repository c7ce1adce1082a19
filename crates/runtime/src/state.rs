// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory state owned by [`crate::server::RunServer`].
//!
//! Four independent mutexes guard disjoint pieces of state. When more
//! than one is needed in sequence the fixed acquisition order is
//! **state -> ref-count -> names -> memo**; no code path holds two at
//! once. The external lock manager is never called while any of these
//! are held.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use pipedag_core::{MemoEntry, StageId, StageState};

pub struct StageStateTable {
    states: Mutex<Vec<StageState>>,
}

impl StageStateTable {
    pub fn new(num_stages: usize) -> Self {
        Self { states: Mutex::new(vec![StageState::Uninitialized; num_stages]) }
    }

    pub fn get(&self, stage: StageId) -> StageState {
        self.states.lock()[stage.index()]
    }

    pub fn with_lock<R>(&self, f: impl FnOnce(&mut Vec<StageState>) -> R) -> R {
        f(&mut self.states.lock())
    }
}

pub struct RefCountTable {
    counts: Mutex<Vec<i64>>,
}

impl RefCountTable {
    pub fn new(initial: Vec<i64>) -> Self {
        Self { counts: Mutex::new(initial) }
    }

    pub fn get(&self, stage: StageId) -> i64 {
        self.counts.lock()[stage.index()]
    }

    pub fn with_lock<R>(&self, f: impl FnOnce(&mut Vec<i64>) -> R) -> R {
        f(&mut self.counts.lock())
    }
}

#[derive(Default)]
pub struct StageNames {
    pub tables: HashSet<String>,
    pub blobs: HashSet<String>,
}

pub struct NameTable {
    names: Mutex<Vec<StageNames>>,
}

impl NameTable {
    pub fn new(num_stages: usize) -> Self {
        Self { names: Mutex::new((0..num_stages).map(|_| StageNames::default()).collect()) }
    }

    pub fn with_lock<R>(&self, f: impl FnOnce(&mut Vec<StageNames>) -> R) -> R {
        f(&mut self.names.lock())
    }
}

/// `memo_key = (stage, joined cache keys)`, matching the original
/// implementation's `get_memo_key`.
pub type MemoKey = (StageId, String);

pub struct MemoTable {
    entries: Mutex<HashMap<MemoKey, MemoEntry>>,
}

impl MemoTable {
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }

    pub fn with_lock<R>(&self, f: impl FnOnce(&mut HashMap<MemoKey, MemoEntry>) -> R) -> R {
        f(&mut self.entries.lock())
    }
}

impl Default for MemoTable {
    fn default() -> Self {
        Self::new()
    }
}

pub fn join_cache_keys(cache_keys: &[String]) -> String {
    cache_keys.join("-")
}
