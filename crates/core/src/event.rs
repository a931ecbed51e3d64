// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Observable event types.
//!
//! Serializes with `{"type": "scope:name", ...fields}` format so events can
//! cross the wire unchanged.

use crate::module::ModuleState;
use serde::{Deserialize, Serialize};

/// Events emitted by the module manager's table.
///
/// Structural events (rows inserted/removed) carry an inclusive index
/// range; per-row events carry the row index at emission time. Indices are
/// stable only until the next structural event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ManagerEvent {
    #[serde(rename = "manager:rows_inserted")]
    RowsInserted { first: usize, last: usize },

    #[serde(rename = "manager:rows_removed")]
    RowsRemoved { first: usize, last: usize },

    #[serde(rename = "module:state_changed")]
    StateChanged { index: usize, name: String, state: ModuleState },

    #[serde(rename = "module:appdata_changed")]
    AppDataChanged { index: usize, name: String, has_appdata: bool },
}

/// State of a task worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Idle,
    Running,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Idle => f.write_str("idle"),
            TaskState::Running => f.write_str("running"),
        }
    }
}

/// Events emitted by task workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TaskEvent {
    #[serde(rename = "task:state_changed")]
    StateChanged { name: String, state: TaskState },

    #[serde(rename = "task:parameters_changed")]
    ParametersChanged { name: String },

    #[serde(rename = "task:finished")]
    Finished { name: String, succeeded: bool },
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
