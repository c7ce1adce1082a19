// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The lock-manager interface, treated opaquely by the run coordination
//! core (spec §4.B). Any implementation must provide mutual exclusion
//! between concurrent flows targeting the same stages.

use async_trait::async_trait;
use pipedag_core::{LockError, LockState, StageId};

/// Callback invoked whenever a lock's observed state changes.
pub type LockStateListener = Box<dyn Fn(LockKey, LockState, LockState) + Send + Sync>;

/// A lock is keyed either by a stage or by a free-form name, the latter
/// used for the run-wide setup lock (the original implementation's
/// `_pipedag_setup_`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockKey {
    Stage(StageId),
    Named(String),
}

impl std::fmt::Display for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockKey::Stage(s) => write!(f, "stage:{s}"),
            LockKey::Named(n) => write!(f, "named:{n}"),
        }
    }
}

/// Backend for distributed mutual exclusion over stages (and, via
/// [`LockKey::Named`], over arbitrary run-scoped critical sections).
///
/// The core never interprets lock state beyond [`LockState`]; it calls
/// `acquire`/`release`/`validate` and otherwise treats the manager as an
/// opaque dependency. Implementations must guarantee that two concurrent
/// processes calling `acquire` on the same key never both observe
/// `LockState::Locked` at once.
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Blocks until the key is `Locked`, or fails with `LockError`.
    async fn acquire(&self, key: LockKey) -> Result<(), LockError>;

    /// Releases a previously acquired lock. A release of a key that is
    /// not held is a no-op.
    async fn release(&self, key: LockKey) -> Result<(), LockError>;

    /// Current observed state, without blocking.
    fn get_state(&self, key: &LockKey) -> LockState;

    /// Blocks while the key's state is `Uncertain`, then returns `Ok(())`
    /// if it resolved to `Locked`, or `LockError` if it resolved to
    /// `Unlocked`/`Invalid`.
    async fn validate(&self, key: &LockKey) -> Result<(), LockError>;

    /// Registers a callback invoked on every lock-state transition.
    /// Implementations call every registered listener; listeners must not
    /// block for long since they typically run on the manager's own
    /// lease-renewal thread.
    fn add_listener(&self, listener: LockStateListener);

    /// Releases every lock currently held by this manager. Called during
    /// run teardown, including on an unclean shutdown.
    async fn release_all(&self) -> Result<(), LockError>;
}

/// Convenience extension for the common case of locking a single stage.
#[async_trait]
pub trait StageLockManagerExt: LockManager {
    async fn acquire_stage(&self, stage: StageId) -> Result<(), LockError> {
        self.acquire(LockKey::Stage(stage)).await
    }

    async fn release_stage(&self, stage: StageId) -> Result<(), LockError> {
        self.release(LockKey::Stage(stage)).await
    }

    async fn validate_stage(&self, stage: StageId) -> Result<(), LockError> {
        self.validate(&LockKey::Stage(stage)).await
    }
}

impl<T: LockManager + ?Sized> StageLockManagerExt for T {}
