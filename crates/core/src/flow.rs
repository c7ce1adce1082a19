// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Static flow description: stages and tasks, assigned dense ids at build
//! time so the run-state server can index them directly with arrays.

use std::collections::HashSet;

use crate::error::FlowError;
use crate::ids::{StageId, TaskId};
use crate::stage::Stage;
use crate::task::{CachePolicy, Task};

/// An ordered list of stages and an ordered list of tasks, the static
/// description of a single run.
#[derive(Debug, Clone, Default)]
pub struct Flow {
    pub stages: Vec<Stage>,
    pub tasks: Vec<Task>,
}

impl Flow {
    pub fn stage(&self, id: StageId) -> Option<&Stage> {
        self.stages.get(id.index())
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(id.index())
    }

    /// `ref_count[s]` as defined by the spec: the number of tasks that
    /// declare `s` among their upstream stages.
    pub fn initial_ref_count(&self, stage: StageId) -> u64 {
        self.tasks
            .iter()
            .filter(|t| t.upstream_stages.contains(&stage))
            .count() as u64
    }
}

/// Builder that assigns dense [`StageId`]/[`TaskId`] values in declaration
/// order and validates stage-name uniqueness and upstream-stage
/// references before producing a [`Flow`].
#[derive(Debug, Default)]
pub struct FlowBuilder {
    stages: Vec<Stage>,
    stage_names: HashSet<String>,
    tasks: Vec<Task>,
}

impl FlowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stage(&mut self, name: impl Into<String>) -> Result<StageId, FlowError> {
        let name = name.into();
        if !self.stage_names.insert(name.clone()) {
            return Err(FlowError::DuplicateStageName { name });
        }
        let id = StageId(self.stages.len() as u32);
        self.stages.push(Stage::new(id, name));
        Ok(id)
    }

    pub fn add_task(
        &mut self,
        stage: StageId,
        upstream_stages: Vec<StageId>,
        cache_policy: CachePolicy,
    ) -> TaskId {
        let id = TaskId(self.tasks.len() as u32);
        self.tasks
            .push(Task::new(id, stage, upstream_stages).with_cache_policy(cache_policy));
        id
    }

    pub fn build(self) -> Result<Flow, FlowError> {
        if self.stages.is_empty() {
            return Err(FlowError::Empty);
        }
        Ok(Flow { stages: self.stages, tasks: self.tasks })
    }
}
