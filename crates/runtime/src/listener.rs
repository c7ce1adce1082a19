// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC transport (spec §4.A): accepts worker connections on a loopback
//! TCP endpoint and dispatches framed requests to the [`RunServer`].
//!
//! Each connection is handled on its own spawned task, so distinct RPCs
//! may interleave freely; each individual RPC stays atomic with respect
//! to the server's internal mutexes because `RunServer::handle_request`
//! only ever holds one at a time.

use std::net::SocketAddr;
use std::sync::Arc;

use pipedag_wire::{ProtocolError, Request, Response};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::server::RunServer;

/// Runs the accept loop until `shutdown` is triggered, spawning one task
/// per accepted connection. Returns the bound address so the caller can
/// publish it to workers.
pub async fn serve(
    bind_addr: &str,
    server: Arc<RunServer>,
    shutdown: CancellationToken,
) -> std::io::Result<SocketAddr> {
    let listener = TcpListener::bind(bind_addr).await?;
    let local_addr = listener.local_addr()?;
    info!(%local_addr, "run server listening");

    tokio::spawn(accept_loop(listener, server, shutdown));
    Ok(local_addr)
}

async fn accept_loop(listener: TcpListener, server: Arc<RunServer>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("accept loop received shutdown signal");
                return;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let server = Arc::clone(&server);
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, server, shutdown).await {
                                log_connection_error(peer, e);
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "accept error"),
                }
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    server: Arc<RunServer>,
    shutdown: CancellationToken,
) -> Result<(), ProtocolError> {
    loop {
        let request: Request = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            result = pipedag_wire::read_framed(&mut stream) => {
                match result {
                    Ok(request) => request,
                    Err(ProtocolError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        let is_shutdown = matches!(request, Request::Shutdown);
        let response: Response = server.handle_request(request).await;
        pipedag_wire::write_framed(&mut stream, &response).await?;

        if is_shutdown {
            shutdown.cancel();
            return Ok(());
        }
    }
}

fn log_connection_error(peer: SocketAddr, err: ProtocolError) {
    warn!(%peer, error = %err, "connection handling failed");
}
