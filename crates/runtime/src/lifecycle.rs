// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stage lifecycle coordinator (spec §4.E): the only sanctioned way to
//! drive a stage through `init`/`commit`.
//!
//! `init_stage`/`commit_stage` take an async closure that receives
//! `should_execute`: `true` means the caller owns the transition and must
//! report back via the closure's `Result`; `false` means a peer already
//! did the work and the caller should skip it. This stands in for the
//! original implementation's `@contextmanager`-based generators, which
//! Rust has no direct equivalent for.

use pipedag_core::{StageError, StageId};

use crate::client::RunClient;

/// Drives `stage` through its init transition. `body` runs only if this
/// caller owns the transition (`should_execute == true`); its `Ok`/`Err`
/// outcome determines whether the stage resolves to READY or FAILED.
pub async fn init_stage<F, Fut, T>(client: &RunClient, stage: StageId, body: F) -> Result<T, StageError>
where
    F: FnOnce(bool) -> Fut,
    Fut: std::future::Future<Output = Result<T, StageError>>,
{
    let should_execute = client
        .enter_init_stage(stage)
        .await
        .map_err(|_| StageError::Failed { stage })?;

    match body(should_execute).await {
        Ok(value) => {
            if should_execute {
                let _ = client.exit_init_stage(stage, true).await;
            }
            Ok(value)
        }
        Err(e) => {
            if should_execute {
                let _ = client.exit_init_stage(stage, false).await;
            }
            Err(e)
        }
    }
}

/// Drives `stage` through its commit transition, symmetric to
/// [`init_stage`].
pub async fn commit_stage<F, Fut, T>(client: &RunClient, stage: StageId, body: F) -> Result<T, StageError>
where
    F: FnOnce(bool) -> Fut,
    Fut: std::future::Future<Output = Result<T, StageError>>,
{
    let should_execute = client
        .enter_commit_stage(stage)
        .await
        .map_err(|_| StageError::Failed { stage })?;

    match body(should_execute).await {
        Ok(value) => {
            if should_execute {
                let _ = client.exit_commit_stage(stage, true).await;
            }
            Ok(value)
        }
        Err(e) => {
            if should_execute {
                let _ = client.exit_commit_stage(stage, false).await;
            }
            Err(e)
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
