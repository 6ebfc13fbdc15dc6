//! The versioning engine: cell pipeline, branch manager, restore
//! protocol, and agent-run handling, composed over the storage layers.

pub mod agent;
pub mod restore;
pub mod service;
pub mod types;

pub use service::{init_repository, Service};
pub use types::{
    cell_id, AgentCompletionOptions, AgentCompletionResult, AgentCompletionStatus, SnapOptions,
    WorkingTreeDelta,
};
