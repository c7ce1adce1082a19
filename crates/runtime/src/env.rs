// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the runtime crate.

use std::time::Duration;

/// Bind address for the run-state server's TCP endpoint
/// (`PIPEDAG_NETWORK_INTERFACE`, default `127.0.0.1:0` — an ephemeral
/// port chosen by the OS).
pub fn network_interface() -> String {
    std::env::var("PIPEDAG_NETWORK_INTERFACE").unwrap_or_else(|_| "127.0.0.1:0".to_string())
}

/// Whether a run should omit the cache-fn contribution from task cache
/// keys (`PIPEDAG_IGNORE_FRESH_INPUT`), so fresh-input changes alone
/// cannot invalidate an otherwise-equal task.
pub fn ignore_fresh_input() -> bool {
    std::env::var("PIPEDAG_IGNORE_FRESH_INPUT")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Spin-wait quantum used by the stage-transition and memo-wait loops
/// (`PIPEDAG_SPIN_QUANTUM_MS`, default 10ms as in the original
/// implementation).
pub fn spin_quantum() -> Duration {
    std::env::var("PIPEDAG_SPIN_QUANTUM_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_millis(10))
}

/// Timeout applied to an individual `RunClient` RPC round-trip
/// (`PIPEDAG_RPC_TIMEOUT_MS`, default 60s as in the original
/// implementation's memo-wait condition timeout).
pub fn rpc_timeout() -> Duration {
    std::env::var("PIPEDAG_RPC_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(60))
}
