// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dematerialization context (spec §4.G): a read-only substitute for the
//! live run context, used once a run has finished so callers can still
//! resolve committed artifacts.
//!
//! The original implementation swapped this in for `RunContext` behind a
//! shared `ContextVar`, relying on Python's dynamic attribute lookup to
//! make both classes interchangeable. Rust has no equivalent dynamic
//! scoping, so [`RunContextOps`] makes the shared surface an explicit
//! trait both [`crate::client::RunClient`] and [`DematerializeContext`]
//! implement.

use async_trait::async_trait;
use pipedag_core::{RemoteProcessError, StageId, StageState};

use crate::client::RunClient;

/// Operations a task needs from whichever run context is active:
/// the live client proxy during a run, or [`DematerializeContext`]
/// afterwards.
#[async_trait]
pub trait RunContextOps: Send + Sync {
    async fn get_stage_state(&self, stage: StageId) -> Result<StageState, RemoteProcessError>;
    async fn validate_stage_lock(&self, stage: StageId) -> Result<(), RemoteProcessError>;
}

#[async_trait]
impl RunContextOps for RunClient {
    async fn get_stage_state(&self, stage: StageId) -> Result<StageState, RemoteProcessError> {
        RunClient::get_stage_state(self, stage).await
    }

    async fn validate_stage_lock(&self, stage: StageId) -> Result<(), RemoteProcessError> {
        RunClient::validate_stage_lock(self, stage).await
    }
}

/// Reports every stage as COMMITTED and treats lock validation as a
/// no-op, so code written against [`RunContextOps`] can run unchanged
/// after the run that produced the artifacts has exited.
pub struct DematerializeContext;

#[async_trait]
impl RunContextOps for DematerializeContext {
    async fn get_stage_state(&self, _stage: StageId) -> Result<StageState, RemoteProcessError> {
        Ok(StageState::Committed)
    }

    async fn validate_stage_lock(&self, _stage: StageId) -> Result<(), RemoteProcessError> {
        Ok(())
    }
}
