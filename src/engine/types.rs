//! Core value types shared across the engine.

use serde::Serialize;

/// Format a sequence number as a cell id: `c_` + six-digit zero-padded
/// decimal. This is the only way cell ids are minted.
#[must_use]
pub fn cell_id(sequence: i64) -> String {
    format!("c_{sequence:06}")
}

/// Options for creating a cell.
#[derive(Debug, Default, Clone)]
pub struct SnapOptions {
    pub message: String,
    pub tags: String,
    pub agent: String,
    pub source: String,
    pub run_eval: bool,
}

/// Working-tree change counts relative to the active branch head.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct WorkingTreeDelta {
    pub modified: i64,
    pub added: i64,
    pub removed: i64,
}

impl WorkingTreeDelta {
    /// True when the tree matches the head manifest.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.modified == 0 && self.added == 0 && self.removed == 0
    }
}

/// Terminal outcome of an agent completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentCompletionStatus {
    Created,
    NoChange,
    Duplicate,
    Failed,
}

impl AgentCompletionStatus {
    /// Status string as persisted in the agent_runs table.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::NoChange => "no_change",
            Self::Duplicate => "duplicate",
            Self::Failed => "failed",
        }
    }
}

/// Inputs to an agent-completion hook.
#[derive(Debug, Default, Clone)]
pub struct AgentCompletionOptions {
    pub run_id: String,
    pub agent: String,
    pub message: String,
    pub tags: String,
    pub source: String,
    pub run_eval: bool,
}

/// Outcome of an agent-completion hook, echoed to the agent as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct AgentCompletionResult {
    pub status: AgentCompletionStatus,
    pub run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell_id: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub branch: String,
    pub source: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}
