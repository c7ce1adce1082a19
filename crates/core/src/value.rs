// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized artifact references.
//!
//! Tasks exchange opaque handles to stored artifacts rather than the
//! artifacts themselves; the store crate resolves a handle to actual data
//! at dematerialization time. The run-coordination core never inspects the
//! artifact payload, only its name and owning stage.

use serde::{Deserialize, Serialize};

use crate::ids::StageId;

/// Reference to a table-like artifact materialized into a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub name: String,
    pub stage: StageId,
}

impl TableRef {
    pub fn new(name: impl Into<String>, stage: StageId) -> Self {
        Self { name: name.into(), stage }
    }
}

/// Reference to an opaque blob artifact materialized into a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    pub name: String,
    pub stage: StageId,
}

impl BlobRef {
    pub fn new(name: impl Into<String>, stage: StageId) -> Self {
        Self { name: name.into(), stage }
    }
}

/// A value produced by a task, as seen by the run-coordination core.
///
/// `Raw` carries data that round-trips through the wire format directly
/// (used for memoized results kept only in-process); `Table`/`Blob` carry
/// handles the store resolves on dematerialization. `Opaque` is the escape
/// hatch for payloads the core cannot and should not interpret — see
/// `pipedag_wire::ext`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MaterializedValue {
    Raw(serde_json::Value),
    Table(TableRef),
    Blob(BlobRef),
    Opaque(Vec<u8>),
}
