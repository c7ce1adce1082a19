// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for tests in downstream crates.
//!
//! Gated behind `test-support` so `pipedag-lock`, `pipedag-store` and
//! `pipedag-runtime` can depend on it as a dev-dependency without pulling
//! it into release builds of `pipedag-core` itself.

#![allow(clippy::expect_used)]

use crate::flow::{Flow, FlowBuilder};
use crate::ids::StageId;
use crate::task::CachePolicy;

/// A three-stage linear flow: `raw -> staging -> derived`, with one task
/// per stage reading the entirety of its immediate upstream.
pub fn linear_flow() -> (Flow, StageId, StageId, StageId) {
    let mut builder = FlowBuilder::new();
    let raw = builder.add_stage("raw").expect("raw stage");
    let staging = builder.add_stage("staging").expect("staging stage");
    let derived = builder.add_stage("derived").expect("derived stage");

    builder.add_task(raw, vec![], CachePolicy::default());
    builder.add_task(staging, vec![raw], CachePolicy::default());
    builder.add_task(derived, vec![staging], CachePolicy::default());

    let flow = builder.build().expect("non-empty flow");
    (flow, raw, staging, derived)
}

/// A flow with two stages and no dependency between them, useful for
/// exercising concurrent stage initialization.
pub fn disjoint_flow() -> (Flow, StageId, StageId) {
    let mut builder = FlowBuilder::new();
    let a = builder.add_stage("a").expect("stage a");
    let b = builder.add_stage("b").expect("stage b");
    builder.add_task(a, vec![], CachePolicy::default());
    builder.add_task(b, vec![], CachePolicy::default());
    let flow = builder.build().expect("non-empty flow");
    (flow, a, b)
}
