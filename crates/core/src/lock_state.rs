// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock state as observed through a [`LockManager`](crate) listener.

use serde::{Deserialize, Serialize};

/// State of a stage's distributed lock, managed by the external
/// lock-manager backend and observed via a listener callback.
///
/// `Uncertain` is transient (e.g. a lease-renewal failure) and must
/// eventually resolve to `Locked` or `Invalid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockState {
    Locked,
    Unlocked,
    Invalid,
    Uncertain,
}

impl std::fmt::Display for LockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LockState::Locked => "LOCKED",
            LockState::Unlocked => "UNLOCKED",
            LockState::Invalid => "INVALID",
            LockState::Uncertain => "UNCERTAIN",
        };
        write!(f, "{s}")
    }
}
