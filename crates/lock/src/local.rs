// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process reference lock manager.
//!
//! Suitable for a single-process run (tests, the demo CLI) where mutual
//! exclusion between stages only needs to hold within this run, not
//! across OS processes. A production deployment would swap in a
//! database-advisory-lock or Zookeeper-backed implementation behind the
//! same [`LockManager`] trait.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use pipedag_core::{LockError, LockState};
use tracing::{debug, warn};

use crate::manager::{LockKey, LockManager, LockStateListener};

struct Inner {
    states: HashMap<LockKey, LockState>,
    listeners: Vec<LockStateListener>,
}

/// Reference [`LockManager`] backed by a single process-local mutex.
/// Acquisition never actually blocks since there is no contention across
/// processes, but the state machine and listener notifications match what
/// a real distributed backend would do.
pub struct LocalLockManager {
    inner: Arc<Mutex<Inner>>,
}

impl LocalLockManager {
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(Inner { states: HashMap::new(), listeners: Vec::new() })) }
    }

    fn transition(&self, key: &LockKey, new: LockState) {
        let mut fire = None;
        {
            let mut inner = self.inner.lock();
            let old = inner.states.get(key).copied().unwrap_or(LockState::Unlocked);
            if old != new {
                inner.states.insert(key.clone(), new);
                fire = Some(old);
            }
        }
        if let Some(old) = fire {
            debug!(%key, ?old, ?new, "lock state transition");
            let inner = self.inner.lock();
            for listener in &inner.listeners {
                listener(key.clone(), old, new);
            }
        }
    }
}

impl Default for LocalLockManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LockManager for LocalLockManager {
    async fn acquire(&self, key: LockKey) -> Result<(), LockError> {
        self.transition(&key, LockState::Locked);
        Ok(())
    }

    async fn release(&self, key: LockKey) -> Result<(), LockError> {
        self.transition(&key, LockState::Unlocked);
        Ok(())
    }

    fn get_state(&self, key: &LockKey) -> LockState {
        self.inner.lock().states.get(key).copied().unwrap_or(LockState::Unlocked)
    }

    async fn validate(&self, key: &LockKey) -> Result<(), LockError> {
        loop {
            match self.get_state(key) {
                LockState::Locked => return Ok(()),
                LockState::Uncertain => {
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    continue;
                }
                LockState::Unlocked => {
                    warn!(%key, "validate observed UNLOCKED");
                    return Err(LockError::Unlocked { key: key.to_string() });
                }
                LockState::Invalid => {
                    warn!(%key, "validate observed INVALID");
                    return Err(LockError::Invalid { key: key.to_string() });
                }
            }
        }
    }

    fn add_listener(&self, listener: LockStateListener) {
        self.inner.lock().listeners.push(listener);
    }

    async fn release_all(&self) -> Result<(), LockError> {
        let keys: Vec<LockKey> = self.inner.lock().states.keys().cloned().collect();
        for key in keys {
            self.transition(&key, LockState::Unlocked);
        }
        Ok(())
    }
}
