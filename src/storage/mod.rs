//! SQLite metadata layer.
//!
//! This module owns every persisted record except file bytes (those live
//! in the blob store):
//! - WAL mode with a 5-second busy timeout for concurrent callers
//! - IMMEDIATE-transaction discipline for multi-statement mutations
//! - A single named sequence counter as the cell-id authority
//!
//! # Submodules
//!
//! - [`schema`] - Base DDL
//! - [`migrations`] - Legacy upgrade and state seeding
//! - [`sqlite`] - The `Database` handle and record types
//! - [`agent_runs`] - Idempotent agent-run reservations

pub mod agent_runs;
pub mod migrations;
pub mod schema;
pub mod sqlite;

pub use agent_runs::{AGENT_RUN_SOURCE_DEFAULT, AGENT_RUN_STATUS_RUNNING};
pub use sqlite::{manifest_hashes, AgentRun, Branch, Cell, Database, ManifestEntry};
