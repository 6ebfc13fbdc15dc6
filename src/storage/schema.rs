//! Database schema definitions.
//!
//! The complete SQLite schema for converge metadata: cells, manifest
//! entries, branches, the key/value meta table, the sequence allocator,
//! and agent-run reservations.

use rusqlite::Connection;

/// The complete SQL schema for the converge database.
///
/// Timestamps are stored as RFC-3339 nanosecond UTC strings. All DDL is
/// idempotent (`IF NOT EXISTS`) so it is safe to apply on every open.
pub const SCHEMA_SQL: &str = r"
-- ====================
-- Cells
-- ====================

CREATE TABLE IF NOT EXISTS cells (
    id TEXT PRIMARY KEY,
    sequence INTEGER UNIQUE NOT NULL,
    parent_id TEXT,
    timestamp TEXT NOT NULL,
    message TEXT NOT NULL DEFAULT '',
    source TEXT NOT NULL DEFAULT 'manual',
    agent TEXT,
    tags TEXT,
    branch TEXT NOT NULL DEFAULT 'main',
    files_added INTEGER NOT NULL DEFAULT 0,
    files_modified INTEGER NOT NULL DEFAULT 0,
    files_removed INTEGER NOT NULL DEFAULT 0,
    lines_added INTEGER NOT NULL DEFAULT 0,
    lines_removed INTEGER NOT NULL DEFAULT 0,
    total_loc INTEGER NOT NULL DEFAULT 0,
    loc_delta INTEGER NOT NULL DEFAULT 0,
    total_files INTEGER NOT NULL DEFAULT 0,
    eval_requested INTEGER NOT NULL DEFAULT 0,
    eval_ran INTEGER NOT NULL DEFAULT 0,
    tests_passed INTEGER,
    tests_failed INTEGER,
    lint_errors INTEGER,
    type_errors INTEGER,
    eval_skipped TEXT,
    eval_error TEXT,
    FOREIGN KEY(parent_id) REFERENCES cells(id)
);

CREATE INDEX IF NOT EXISTS idx_cells_sequence ON cells(sequence DESC);

-- ====================
-- Manifest Entries
-- ====================

CREATE TABLE IF NOT EXISTS manifest_entries (
    cell_id TEXT NOT NULL,
    path TEXT NOT NULL,
    hash TEXT NOT NULL,
    mode INTEGER NOT NULL,
    size INTEGER NOT NULL,
    PRIMARY KEY (cell_id, path),
    FOREIGN KEY(cell_id) REFERENCES cells(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_manifest_cell ON manifest_entries(cell_id);

-- ====================
-- Branches + Meta
-- ====================

CREATE TABLE IF NOT EXISTS branches (
    name TEXT PRIMARY KEY,
    head_cell_id TEXT REFERENCES cells(id),
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- ====================
-- Sequence Allocator
-- ====================

CREATE TABLE IF NOT EXISTS cell_sequences (
    name TEXT PRIMARY KEY,
    last_sequence INTEGER NOT NULL
);

-- ====================
-- Agent Runs
-- ====================

CREATE TABLE IF NOT EXISTS agent_runs (
    run_id TEXT PRIMARY KEY,
    agent TEXT NOT NULL,
    message TEXT NOT NULL DEFAULT '',
    tags TEXT,
    source TEXT NOT NULL DEFAULT 'agent_complete',
    status TEXT NOT NULL,
    branch TEXT,
    cell_id TEXT,
    error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_agent_runs_updated_at ON agent_runs(updated_at DESC);
";

/// Apply the base schema to a connection.
///
/// # Errors
///
/// Returns an error if any DDL statement fails.
pub fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}
