// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pipedag-runtime: the run-state server, its client proxy, and the
//! stage-lifecycle/materialization protocols built on top of them.
//!
//! A run wires together one [`server::RunServer`] (reached over
//! [`listener::serve`] by every worker's [`client::RunClient`]), a
//! [`config::ConfigContext`] bundling the store and lock manager, and a
//! [`materialize::MaterializationWrapper`] per worker driving each task
//! through [`lifecycle::init_stage`]/[`lifecycle::commit_stage`].

pub mod client;
pub mod config;
pub mod dematerialize;
pub mod env;
pub mod lifecycle;
pub mod listener;
pub mod materialize;
pub mod server;
mod state;

pub use client::RunClient;
pub use config::ConfigContext;
pub use dematerialize::{DematerializeContext, RunContextOps};
pub use lifecycle::{commit_stage, init_stage};
pub use listener::serve;
pub use materialize::{semi_deep_copy, MaterializationWrapper};
pub use server::RunServer;
