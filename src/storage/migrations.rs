//! Legacy-schema migration and state seeding.
//!
//! Databases created before branching existed lack the `cells.branch`
//! column and the branch/meta/sequence seed rows. `run_migrations` brings
//! any such database up to the current shape inside one transaction, and
//! is a no-op (beyond cheap reads) on an already-migrated database.

use rusqlite::{Connection, OptionalExtension};
use tracing::{info, warn};

use crate::config::now_rfc3339;
use crate::error::Result;

/// Upgrade a freshly-opened database to the current schema shape and seed
/// the branch, meta, and sequence-allocator rows.
///
/// Steps, all inside one transaction:
/// 1. Add `cells.branch` (default `'main'`) when absent, backfill blanks.
/// 2. Ensure the `(branch, sequence)` index exists.
/// 3. Seed the `main` branch row pointing at the latest existing cell.
/// 4. Seed `meta['active_branch']` and `meta['head_cell']`.
/// 5. Seed the `default` sequence counter to `max(cells.sequence, 0)`.
///
/// # Errors
///
/// Returns an error if any migration statement fails; the transaction is
/// rolled back and the database is left untouched.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;

    match tx.execute(
        "ALTER TABLE cells ADD COLUMN branch TEXT NOT NULL DEFAULT 'main'",
        [],
    ) {
        Ok(_) => info!("added cells.branch column"),
        Err(e) if is_duplicate_column(&e) => {}
        Err(e) => return Err(e.into()),
    }

    tx.execute(
        "UPDATE cells SET branch = 'main' WHERE branch IS NULL OR TRIM(branch) = ''",
        [],
    )?;
    tx.execute(
        "CREATE INDEX IF NOT EXISTS idx_cells_branch_sequence ON cells(branch, sequence DESC)",
        [],
    )?;

    let latest_id: Option<String> = tx
        .query_row(
            "SELECT id FROM cells ORDER BY sequence DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    let now = now_rfc3339();
    tx.execute(
        "INSERT INTO branches (name, head_cell_id, created_at) VALUES ('main', ?1, ?2)
         ON CONFLICT(name) DO NOTHING",
        rusqlite::params![latest_id, now],
    )?;
    if let Some(ref id) = latest_id {
        tx.execute(
            "UPDATE branches SET head_cell_id = COALESCE(head_cell_id, ?1) WHERE name = 'main'",
            [id],
        )?;
    }

    tx.execute(
        "INSERT OR IGNORE INTO meta (key, value) VALUES ('active_branch', 'main')",
        [],
    )?;
    tx.execute(
        "INSERT OR IGNORE INTO meta (key, value) VALUES ('head_cell', ?1)",
        [latest_id.as_deref().unwrap_or("")],
    )?;

    let max_sequence: i64 = tx.query_row(
        "SELECT COALESCE(MAX(sequence), 0) FROM cells",
        [],
        |row| row.get(0),
    )?;
    tx.execute(
        "INSERT INTO cell_sequences (name, last_sequence) VALUES ('default', ?1)
         ON CONFLICT(name) DO UPDATE SET
             last_sequence = CASE
                 WHEN cell_sequences.last_sequence < excluded.last_sequence
                     THEN excluded.last_sequence
                 ELSE cell_sequences.last_sequence
             END",
        [max_sequence],
    )?;

    tx.commit()?;
    Ok(())
}

fn is_duplicate_column(e: &rusqlite::Error) -> bool {
    let text = e.to_string().to_lowercase();
    if text.contains("duplicate column name") {
        return true;
    }
    warn!(error = %e, "unexpected error while adding branch column");
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::apply_schema;

    fn open_migrated() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        run_migrations(&mut conn).unwrap();
        conn
    }

    #[test]
    fn test_fresh_db_seeds_defaults() {
        let conn = open_migrated();

        let active: String = conn
            .query_row("SELECT value FROM meta WHERE key = 'active_branch'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(active, "main");

        let head: String = conn
            .query_row("SELECT value FROM meta WHERE key = 'head_cell'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(head, "");

        let (branch_head, last_seq): (Option<String>, i64) = (
            conn.query_row("SELECT head_cell_id FROM branches WHERE name = 'main'", [], |r| r.get(0))
                .unwrap(),
            conn.query_row(
                "SELECT last_sequence FROM cell_sequences WHERE name = 'default'",
                [],
                |r| r.get(0),
            )
            .unwrap(),
        );
        assert!(branch_head.is_none());
        assert_eq!(last_seq, 0);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM branches", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_legacy_db_without_branch_column_is_upgraded() {
        let mut conn = Connection::open_in_memory().unwrap();
        // Pre-branching schema: no branch column, no seed rows.
        conn.execute_batch(
            "CREATE TABLE cells (
                id TEXT PRIMARY KEY,
                sequence INTEGER UNIQUE NOT NULL,
                parent_id TEXT,
                timestamp TEXT NOT NULL,
                message TEXT NOT NULL DEFAULT '',
                source TEXT NOT NULL DEFAULT 'manual',
                agent TEXT,
                tags TEXT,
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
                eval_error TEXT
            );
            CREATE TABLE branches (
                name TEXT PRIMARY KEY,
                head_cell_id TEXT,
                created_at TEXT NOT NULL
            );
            CREATE TABLE meta (key TEXT PRIMARY KEY, value TEXT NOT NULL);
            CREATE TABLE cell_sequences (name TEXT PRIMARY KEY, last_sequence INTEGER NOT NULL);
            INSERT INTO cells (id, sequence, timestamp, message)
                VALUES ('c_000001', 1, '2026-01-01T00:00:00.000000000Z', 'legacy'),
                       ('c_000002', 2, '2026-01-02T00:00:00.000000000Z', 'newer');",
        )
        .unwrap();

        run_migrations(&mut conn).unwrap();

        let branch: String = conn
            .query_row("SELECT branch FROM cells WHERE id = 'c_000001'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(branch, "main");

        let head: Option<String> = conn
            .query_row("SELECT head_cell_id FROM branches WHERE name = 'main'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(head.as_deref(), Some("c_000002"));

        let head_meta: String = conn
            .query_row("SELECT value FROM meta WHERE key = 'head_cell'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(head_meta, "c_000002");

        let last_seq: i64 = conn
            .query_row(
                "SELECT last_sequence FROM cell_sequences WHERE name = 'default'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(last_seq, 2);
    }
}
