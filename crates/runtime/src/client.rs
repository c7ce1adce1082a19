// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client proxy (spec §4.D): one per worker, exposing typed operations
//! over a connection to the [`crate::server::RunServer`]'s endpoint.
//!
//! The proxy's only state is the endpoint address, so it can be
//! constructed fresh in any process that knows the address — the same
//! property the original implementation relied on to hand its IPC client
//! across process boundaries via pickling.

use std::net::SocketAddr;

use pipedag_core::{FinalTaskState, MaterializedValue, RemoteError, RemoteProcessError, StageId, TaskId};
use pipedag_wire::{MemoLookup, NameReservation, ProtocolError, Request, Response};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Thin RPC client bound to a [`crate::server::RunServer`]'s address.
///
/// Every request is synchronous from the caller's point of view: one
/// request, one response, over a persistent connection guarded by an
/// internal mutex (two tasks sharing a `RunClient` serialize their RPCs
/// rather than interleave bytes on the wire).
pub struct RunClient {
    addr: SocketAddr,
    connection: Mutex<Option<TcpStream>>,
}

impl RunClient {
    /// Connects to `addr`. Reconnection on a dropped connection is
    /// attempted lazily on the next request.
    pub async fn connect(addr: SocketAddr) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self { addr, connection: Mutex::new(Some(stream)) })
    }

    /// Reconstructs a proxy from just the address, without blocking to
    /// connect. Used when resuming work in a different process.
    pub fn from_addr(addr: SocketAddr) -> Self {
        Self { addr, connection: Mutex::new(None) }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    async fn request(&self, request: Request) -> Result<Response, RemoteProcessError> {
        let mut guard = self.connection.lock().await;
        if guard.is_none() {
            let stream = TcpStream::connect(self.addr).await.map_err(|e| {
                RemoteProcessError::new(RemoteError::new("ConnectionError", e.to_string()))
            })?;
            *guard = Some(stream);
        }
        let Some(stream) = guard.as_mut() else {
            unreachable!("connection was just established above")
        };

        let write_result = pipedag_wire::write_framed(stream, &request).await;
        if write_result.is_err() {
            *guard = None;
        }
        write_result.map_err(protocol_to_remote)?;

        let response: Response = match pipedag_wire::read_framed(stream).await {
            Ok(response) => response,
            Err(e) => {
                *guard = None;
                return Err(protocol_to_remote(e));
            }
        };

        if let Response::Err(wire_err) = response {
            return Err(RemoteProcessError::new(wire_err.into()));
        }
        Ok(response)
    }

    pub async fn get_stage_ref_count(&self, stage: StageId) -> Result<u64, RemoteProcessError> {
        match self.request(Request::GetStageRefCount { stage }).await? {
            Response::RefCount(n) => Ok(n),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_stage_state(
        &self,
        stage: StageId,
    ) -> Result<pipedag_core::StageState, RemoteProcessError> {
        match self.request(Request::GetStageState { stage }).await? {
            Response::StageState(s) => Ok(s),
            other => Err(unexpected(other)),
        }
    }

    pub async fn enter_init_stage(&self, stage: StageId) -> Result<bool, RemoteProcessError> {
        self.expect_bool(Request::EnterInitStage { stage }).await
    }

    pub async fn exit_init_stage(&self, stage: StageId, success: bool) -> Result<(), RemoteProcessError> {
        self.expect_ok(Request::ExitInitStage { stage, success }).await
    }

    pub async fn enter_commit_stage(&self, stage: StageId) -> Result<bool, RemoteProcessError> {
        self.expect_bool(Request::EnterCommitStage { stage }).await
    }

    pub async fn exit_commit_stage(&self, stage: StageId, success: bool) -> Result<(), RemoteProcessError> {
        self.expect_ok(Request::ExitCommitStage { stage, success }).await
    }

    pub async fn acquire_stage_lock(&self, stage: StageId) -> Result<(), RemoteProcessError> {
        self.expect_ok(Request::AcquireStageLock { stage }).await
    }

    pub async fn release_stage_lock(&self, stage: StageId) -> Result<(), RemoteProcessError> {
        self.expect_ok(Request::ReleaseStageLock { stage }).await
    }

    pub async fn validate_stage_lock(&self, stage: StageId) -> Result<(), RemoteProcessError> {
        self.expect_ok(Request::ValidateStageLock { stage }).await
    }

    pub async fn did_finish_task(
        &self,
        task: TaskId,
        final_state: FinalTaskState,
    ) -> Result<(), RemoteProcessError> {
        self.expect_ok(Request::DidFinishTask { task, final_state }).await
    }

    pub async fn enter_task_memo(
        &self,
        task: TaskId,
        cache_keys: Vec<String>,
    ) -> Result<MemoLookup, RemoteProcessError> {
        match self.request(Request::EnterTaskMemo { task, cache_keys }).await? {
            Response::MemoLookup(lookup) => Ok(lookup),
            other => Err(unexpected(other)),
        }
    }

    pub async fn exit_task_memo(
        &self,
        task: TaskId,
        cache_keys: Vec<String>,
        success: bool,
    ) -> Result<(), RemoteProcessError> {
        self.expect_ok(Request::ExitTaskMemo { task, cache_keys, success }).await
    }

    pub async fn store_task_memo(
        &self,
        task: TaskId,
        cache_keys: Vec<String>,
        value: MaterializedValue,
    ) -> Result<(), RemoteProcessError> {
        self.expect_ok(Request::StoreTaskMemo { task, cache_keys, value }).await
    }

    pub async fn add_names(
        &self,
        stage: StageId,
        tables: Vec<String>,
        blobs: Vec<String>,
    ) -> Result<NameReservation, RemoteProcessError> {
        match self.request(Request::AddNames { stage, tables, blobs }).await? {
            Response::NameReservation(r) => Ok(r),
            other => Err(unexpected(other)),
        }
    }

    pub async fn remove_names(
        &self,
        stage: StageId,
        tables: Vec<String>,
        blobs: Vec<String>,
    ) -> Result<(), RemoteProcessError> {
        self.expect_ok(Request::RemoveNames { stage, tables, blobs }).await
    }

    async fn expect_ok(&self, request: Request) -> Result<(), RemoteProcessError> {
        match self.request(request).await? {
            Response::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn expect_bool(&self, request: Request) -> Result<bool, RemoteProcessError> {
        match self.request(request).await? {
            Response::Bool(b) => Ok(b),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(response: Response) -> RemoteProcessError {
    RemoteProcessError::new(RemoteError::new("ProtocolError", format!("unexpected response: {response:?}")))
}

fn protocol_to_remote(err: ProtocolError) -> RemoteProcessError {
    RemoteProcessError::new(RemoteError::new("ConnectionError", err.to_string()))
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
