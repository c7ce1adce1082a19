// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run configuration (spec §6 `ConfigContext`).
//!
//! Bundles the collaborators a run needs: where to bind the RPC server,
//! the store, and the lock manager. Entered/exited like the original
//! implementation's context-manager scope, with open/close idempotent
//! under nested entries via a counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use pipedag_core::CacheError;
use pipedag_lock::LockManager;
use pipedag_store::Store;

/// Collaborators and run flags a [`crate::server::RunServer`] needs to
/// start a run.
pub struct ConfigContext {
    pub network_interface: String,
    pub store: Arc<dyn Store>,
    pub lock_manager: Arc<dyn LockManager>,
    pub ignore_fresh_input: bool,
    open_count: AtomicU64,
}

impl ConfigContext {
    pub fn new(store: Arc<dyn Store>, lock_manager: Arc<dyn LockManager>) -> Self {
        Self {
            network_interface: crate::env::network_interface(),
            store,
            lock_manager,
            ignore_fresh_input: crate::env::ignore_fresh_input(),
            open_count: AtomicU64::new(0),
        }
    }

    /// Opens backend resources. Nested calls only take effect on the
    /// outermost `open`.
    pub async fn open(&self) -> Result<(), CacheError> {
        if self.open_count.fetch_add(1, Ordering::SeqCst) == 0 {
            self.store.open().await?;
        }
        Ok(())
    }

    /// Closes backend resources. Nested calls only take effect once the
    /// open-count returns to zero.
    pub async fn close(&self) -> Result<(), CacheError> {
        if self.open_count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.store.close().await?;
        }
        Ok(())
    }
}
