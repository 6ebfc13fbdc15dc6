//! SQLite metadata database.
//!
//! Owns cells, manifest entries, branches, the key/value meta table, and
//! the sequence allocator. Opens with WAL journaling, foreign keys on, and
//! a 5-second busy timeout; every multi-statement mutation runs inside an
//! IMMEDIATE transaction through [`Database::mutate`].

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde::Serialize;

use crate::config::{now_rfc3339, DEFAULT_BRANCH};
use crate::error::{Error, Result};
use crate::storage::migrations::run_migrations;
use crate::storage::schema::apply_schema;

/// Immutable record of one captured working-tree state.
#[derive(Debug, Clone, Serialize)]
pub struct Cell {
    pub id: String,
    pub sequence: i64,
    pub parent_id: Option<String>,
    pub timestamp: String,
    pub message: String,
    pub source: String,
    pub agent: Option<String>,
    pub tags: Option<String>,
    pub branch: String,
    pub files_added: i64,
    pub files_modified: i64,
    pub files_removed: i64,
    pub lines_added: i64,
    pub lines_removed: i64,
    pub total_loc: i64,
    pub loc_delta: i64,
    pub total_files: i64,
    pub eval_requested: bool,
    pub eval_ran: bool,
    pub tests_passed: Option<i64>,
    pub tests_failed: Option<i64>,
    pub lint_errors: Option<i64>,
    pub type_errors: Option<i64>,
    pub eval_skipped: Option<String>,
    pub eval_error: Option<String>,
}

/// A named moving reference to a head cell.
#[derive(Debug, Clone, Serialize)]
pub struct Branch {
    pub name: String,
    pub head_cell_id: Option<String>,
    pub created_at: String,
}

/// One tracked file inside a cell's manifest.
#[derive(Debug, Clone, Serialize)]
pub struct ManifestEntry {
    pub cell_id: String,
    pub path: String,
    pub hash: String,
    pub mode: i64,
    pub size: i64,
}

/// Idempotency record for one agent invocation.
#[derive(Debug, Clone, Serialize)]
pub struct AgentRun {
    pub run_id: String,
    pub agent: String,
    pub message: String,
    pub tags: Option<String>,
    pub source: String,
    pub status: String,
    pub branch: Option<String>,
    pub cell_id: Option<String>,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// SQLite-backed metadata store.
#[derive(Debug)]
pub struct Database {
    pub(crate) conn: Connection,
}

const CELL_SELECT: &str = "
SELECT
    id, sequence, parent_id, timestamp, message, source, agent, tags, branch,
    files_added, files_modified, files_removed, lines_added, lines_removed,
    total_loc, loc_delta, total_files,
    eval_requested, eval_ran, tests_passed, tests_failed, lint_errors, type_errors,
    eval_skipped, eval_error
FROM cells";

impl Database {
    /// Open (creating if needed) a database at the given path.
    ///
    /// Applies pragmas, the base schema, and migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection, schema, or migration fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, Duration::from_secs(5))
    }

    /// Open with an explicit busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection, schema, or migration fails.
    pub fn open_with_timeout(path: &Path, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Self::finish_open(conn)
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Self::finish_open(conn)
    }

    fn finish_open(mut conn: Connection) -> Result<Self> {
        apply_schema(&conn)?;
        run_migrations(&mut conn)?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Execute a mutation inside an IMMEDIATE transaction.
    ///
    /// The write lock is taken up front; the closure's statements either
    /// all commit or all roll back.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The transaction is rolled back
    /// on error.
    pub fn mutate<F, R>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    // ==================
    // Sequence Allocator
    // ==================

    /// Atomically increment the `default` counter and return the new value.
    ///
    /// This is the sole authority for cell ids: values are unique and
    /// strictly increasing even under concurrent callers (each caller runs
    /// its own write transaction).
    ///
    /// # Errors
    ///
    /// Returns an error if the counter row is missing or the update fails.
    pub fn allocate_sequence(&mut self) -> Result<i64> {
        self.mutate(|tx| {
            let seq = tx.query_row(
                "UPDATE cell_sequences SET last_sequence = last_sequence + 1
                 WHERE name = 'default'
                 RETURNING last_sequence",
                [],
                |row| row.get(0),
            )?;
            Ok(seq)
        })
    }

    // ==================
    // Cells
    // ==================

    /// Insert a cell with its manifest and advance its branch head, all in
    /// one transaction: cell row, manifest rows, sequence-allocator sync,
    /// branch upsert (created at the cell's timestamp when absent), and the
    /// `head_cell` meta mirror. Observers see all of it or none of it.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails; everything rolls back.
    pub fn insert_cell_and_advance_branch(
        &mut self,
        cell: &Cell,
        entries: &[ManifestEntry],
    ) -> Result<()> {
        let branch = if cell.branch.trim().is_empty() {
            DEFAULT_BRANCH.to_string()
        } else {
            cell.branch.trim().to_string()
        };
        let timestamp = if cell.timestamp.trim().is_empty() {
            now_rfc3339()
        } else {
            cell.timestamp.clone()
        };

        self.mutate(|tx| {
            tx.execute(
                "INSERT INTO cells (
                    id, sequence, parent_id, timestamp, message, source, agent, tags, branch,
                    files_added, files_modified, files_removed, lines_added, lines_removed,
                    total_loc, loc_delta, total_files,
                    eval_requested, eval_ran, tests_passed, tests_failed, lint_errors, type_errors,
                    eval_skipped, eval_error
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                          ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)",
                rusqlite::params![
                    cell.id,
                    cell.sequence,
                    cell.parent_id,
                    timestamp,
                    cell.message,
                    cell.source,
                    cell.agent,
                    cell.tags,
                    branch,
                    cell.files_added,
                    cell.files_modified,
                    cell.files_removed,
                    cell.lines_added,
                    cell.lines_removed,
                    cell.total_loc,
                    cell.loc_delta,
                    cell.total_files,
                    i64::from(cell.eval_requested),
                    i64::from(cell.eval_ran),
                    cell.tests_passed,
                    cell.tests_failed,
                    cell.lint_errors,
                    cell.type_errors,
                    cell.eval_skipped,
                    cell.eval_error,
                ],
            )?;

            // Keep the allocator monotone even if this cell's sequence was
            // produced elsewhere (e.g. an imported database).
            tx.execute(
                "INSERT OR IGNORE INTO cell_sequences (name, last_sequence) VALUES ('default', 0)",
                [],
            )?;
            tx.execute(
                "UPDATE cell_sequences
                 SET last_sequence = CASE
                     WHEN last_sequence < ?1 THEN ?1
                     ELSE last_sequence
                 END
                 WHERE name = 'default'",
                [cell.sequence],
            )?;

            for entry in entries {
                tx.execute(
                    "INSERT INTO manifest_entries (cell_id, path, hash, mode, size)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![entry.cell_id, entry.path, entry.hash, entry.mode, entry.size],
                )?;
            }

            tx.execute(
                "INSERT INTO branches (name, head_cell_id, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET head_cell_id = excluded.head_cell_id",
                rusqlite::params![branch, cell.id, timestamp],
            )?;

            tx.execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES ('head_cell', ?1)",
                [&cell.id],
            )?;

            Ok(())
        })
    }

    /// Fill a cell's eval slot. Sets `eval_requested = 1, eval_ran = 1` and
    /// the nullable result columns.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    #[allow(clippy::too_many_arguments)]
    pub fn update_cell_eval(
        &mut self,
        id: &str,
        tests_passed: Option<i64>,
        tests_failed: Option<i64>,
        lint_errors: Option<i64>,
        type_errors: Option<i64>,
        skipped: Option<&str>,
        eval_error: Option<&str>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE cells
             SET eval_requested = 1, eval_ran = 1,
                 tests_passed = ?1, tests_failed = ?2, lint_errors = ?3, type_errors = ?4,
                 eval_skipped = ?5, eval_error = ?6
             WHERE id = ?7",
            rusqlite::params![tests_passed, tests_failed, lint_errors, type_errors, skipped, eval_error, id],
        )?;
        Ok(())
    }

    /// Get a cell by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_cell(&self, id: &str) -> Result<Option<Cell>> {
        let mut stmt = self.conn.prepare(&format!("{CELL_SELECT} WHERE id = ?1"))?;
        let cell = stmt.query_row([id], map_cell_row).optional()?;
        Ok(cell)
    }

    /// Latest cell across all branches, by sequence.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn latest_cell(&self) -> Result<Option<Cell>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CELL_SELECT} ORDER BY sequence DESC LIMIT 1"))?;
        let cell = stmt.query_row([], map_cell_row).optional()?;
        Ok(cell)
    }

    /// Latest cell created on a branch, by sequence.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn latest_cell_by_branch(&self, branch: &str) -> Result<Option<Cell>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CELL_SELECT} WHERE branch = ?1 ORDER BY sequence DESC LIMIT 1"
        ))?;
        let cell = stmt.query_row([branch], map_cell_row).optional()?;
        Ok(cell)
    }

    /// Most recent cells across all branches. Non-positive limits default
    /// to 20.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_cells(&self, limit: i64) -> Result<Vec<Cell>> {
        let limit = if limit <= 0 { 20 } else { limit };
        let mut stmt = self
            .conn
            .prepare(&format!("{CELL_SELECT} ORDER BY sequence DESC LIMIT ?1"))?;
        let rows = stmt.query_map([limit], map_cell_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// Most recent cells on one branch. Non-positive limits default to 20.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_cells_by_branch(&self, branch: &str, limit: i64) -> Result<Vec<Cell>> {
        let limit = if limit <= 0 { 20 } else { limit };
        let mut stmt = self.conn.prepare(&format!(
            "{CELL_SELECT} WHERE branch = ?1 ORDER BY sequence DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(rusqlite::params![branch, limit], map_cell_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    // ==================
    // Manifests
    // ==================

    /// All manifest entries for a cell, ordered by path.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_manifest(&self, cell_id: &str) -> Result<Vec<ManifestEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT cell_id, path, hash, mode, size
             FROM manifest_entries
             WHERE cell_id = ?1
             ORDER BY path ASC",
        )?;
        let rows = stmt.query_map([cell_id], |row| {
            Ok(ManifestEntry {
                cell_id: row.get(0)?,
                path: row.get(1)?,
                hash: row.get(2)?,
                mode: row.get(3)?,
                size: row.get(4)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    // ==================
    // Meta
    // ==================

    /// Get a meta value by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    /// Set a meta value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn set_meta(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }

    // ==================
    // Branches
    // ==================

    /// Create a branch row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a blank name and
    /// [`Error::DuplicateBranch`] if the name is taken.
    pub fn create_branch(
        &mut self,
        name: &str,
        head_cell_id: Option<&str>,
        created_at: &str,
    ) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidArgument("branch name cannot be empty".to_string()));
        }
        let created_at = if created_at.trim().is_empty() {
            now_rfc3339()
        } else {
            created_at.to_string()
        };
        let inserted = self.conn.execute(
            "INSERT INTO branches (name, head_cell_id, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![name, head_cell_id, created_at],
        );
        match inserted {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::DuplicateBranch { name: name.to_string() })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Get a branch by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_branch(&self, name: &str) -> Result<Option<Branch>> {
        let branch = self
            .conn
            .query_row(
                "SELECT name, head_cell_id, created_at FROM branches WHERE name = ?1",
                [name],
                |row| {
                    Ok(Branch {
                        name: row.get(0)?,
                        head_cell_id: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(branch)
    }

    /// Point a branch at a (possibly null) head cell.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BranchNotFound`] when no row matched.
    pub fn update_branch_head(&mut self, name: &str, head_cell_id: Option<&str>) -> Result<()> {
        let affected = self.conn.execute(
            "UPDATE branches SET head_cell_id = ?1 WHERE name = ?2",
            rusqlite::params![head_cell_id, name],
        )?;
        if affected == 0 {
            return Err(Error::BranchNotFound { name: name.to_string() });
        }
        Ok(())
    }

    /// All branches, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_branches(&self) -> Result<Vec<Branch>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, head_cell_id, created_at FROM branches ORDER BY created_at ASC, name ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Branch {
                name: row.get(0)?,
                head_cell_id: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }
}

/// Manifest entries collapsed to a `(path -> hash)` map.
#[must_use]
pub fn manifest_hashes(entries: &[ManifestEntry]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|e| (e.path.clone(), e.hash.clone()))
        .collect()
}

fn map_cell_row(row: &Row<'_>) -> rusqlite::Result<Cell> {
    Ok(Cell {
        id: row.get(0)?,
        sequence: row.get(1)?,
        parent_id: row.get(2)?,
        timestamp: row.get(3)?,
        message: row.get(4)?,
        source: row.get(5)?,
        agent: row.get(6)?,
        tags: row.get(7)?,
        branch: row.get(8)?,
        files_added: row.get(9)?,
        files_modified: row.get(10)?,
        files_removed: row.get(11)?,
        lines_added: row.get(12)?,
        lines_removed: row.get(13)?,
        total_loc: row.get(14)?,
        loc_delta: row.get(15)?,
        total_files: row.get(16)?,
        eval_requested: row.get::<_, i64>(17)? == 1,
        eval_ran: row.get::<_, i64>(18)? == 1,
        tests_passed: row.get(19)?,
        tests_failed: row.get(20)?,
        lint_errors: row.get(21)?,
        type_errors: row.get(22)?,
        eval_skipped: row.get(23)?,
        eval_error: row.get(24)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cell(sequence: i64, branch: &str) -> Cell {
        Cell {
            id: format!("c_{sequence:06}"),
            sequence,
            parent_id: None,
            timestamp: now_rfc3339(),
            message: "test".to_string(),
            source: "manual".to_string(),
            agent: None,
            tags: None,
            branch: branch.to_string(),
            files_added: 0,
            files_modified: 0,
            files_removed: 0,
            lines_added: 0,
            lines_removed: 0,
            total_loc: 0,
            loc_delta: 0,
            total_files: 0,
            eval_requested: false,
            eval_ran: false,
            tests_passed: None,
            tests_failed: None,
            lint_errors: None,
            type_errors: None,
            eval_skipped: None,
            eval_error: None,
        }
    }

    #[test]
    fn test_allocate_sequence_is_monotonic() {
        let mut db = Database::open_memory().unwrap();
        assert_eq!(db.allocate_sequence().unwrap(), 1);
        assert_eq!(db.allocate_sequence().unwrap(), 2);
        assert_eq!(db.allocate_sequence().unwrap(), 3);
    }

    #[test]
    fn test_parallel_sequence_allocation_is_a_permutation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("converge.db");
        // Seed the schema once before the threads race.
        drop(Database::open(&path).unwrap());

        let mut handles = Vec::new();
        for _ in 0..4 {
            let path = path.clone();
            handles.push(std::thread::spawn(move || {
                let mut db = Database::open(&path).unwrap();
                (0..5).map(|_| db.allocate_sequence().unwrap()).collect::<Vec<_>>()
            }));
        }
        let mut all: Vec<i64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (1..=20).collect::<Vec<i64>>());
    }

    #[test]
    fn test_insert_cell_advances_branch_and_meta() {
        let mut db = Database::open_memory().unwrap();
        let seq = db.allocate_sequence().unwrap();
        let cell = test_cell(seq, "main");
        let entries = vec![ManifestEntry {
            cell_id: cell.id.clone(),
            path: "main.go".to_string(),
            hash: "ab".repeat(32),
            mode: 0o644,
            size: 13,
        }];

        db.insert_cell_and_advance_branch(&cell, &entries).unwrap();

        let loaded = db.get_cell(&cell.id).unwrap().unwrap();
        assert_eq!(loaded.sequence, seq);
        assert_eq!(loaded.branch, "main");

        let branch = db.get_branch("main").unwrap().unwrap();
        assert_eq!(branch.head_cell_id.as_deref(), Some(cell.id.as_str()));
        assert_eq!(db.get_meta("head_cell").unwrap().as_deref(), Some(cell.id.as_str()));

        let manifest = db.get_manifest(&cell.id).unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest[0].path, "main.go");
    }

    #[test]
    fn test_insert_rolls_back_on_duplicate_manifest_path() {
        let mut db = Database::open_memory().unwrap();
        let seq = db.allocate_sequence().unwrap();
        let cell = test_cell(seq, "main");
        let entry = ManifestEntry {
            cell_id: cell.id.clone(),
            path: "dup.go".to_string(),
            hash: "cd".repeat(32),
            mode: 0o644,
            size: 1,
        };

        let result =
            db.insert_cell_and_advance_branch(&cell, &[entry.clone(), entry]);
        assert!(result.is_err());

        // Nothing from the failed transaction is visible.
        assert!(db.get_cell(&cell.id).unwrap().is_none());
        let branch = db.get_branch("main").unwrap().unwrap();
        assert!(branch.head_cell_id.is_none());
    }

    #[test]
    fn test_cell_id_matches_sequence_format() {
        let mut db = Database::open_memory().unwrap();
        for _ in 0..3 {
            let seq = db.allocate_sequence().unwrap();
            let cell = test_cell(seq, "main");
            db.insert_cell_and_advance_branch(&cell, &[]).unwrap();
        }
        for cell in db.list_cells(10).unwrap() {
            assert!(cell.sequence > 0);
            assert_eq!(cell.id, format!("c_{:06}", cell.sequence));
        }
    }

    #[test]
    fn test_update_cell_eval_fills_slot() {
        let mut db = Database::open_memory().unwrap();
        let seq = db.allocate_sequence().unwrap();
        let cell = test_cell(seq, "main");
        db.insert_cell_and_advance_branch(&cell, &[]).unwrap();

        db.update_cell_eval(&cell.id, Some(7), Some(1), Some(0), None, Some("mypy"), None)
            .unwrap();

        let loaded = db.get_cell(&cell.id).unwrap().unwrap();
        assert!(loaded.eval_requested);
        assert!(loaded.eval_ran);
        assert_eq!(loaded.tests_passed, Some(7));
        assert_eq!(loaded.tests_failed, Some(1));
        assert_eq!(loaded.lint_errors, Some(0));
        assert_eq!(loaded.type_errors, None);
        assert_eq!(loaded.eval_skipped.as_deref(), Some("mypy"));
    }

    #[test]
    fn test_branch_crud() {
        let mut db = Database::open_memory().unwrap();

        db.create_branch("feature-a", None, &now_rfc3339()).unwrap();
        assert!(db.get_branch("feature-a").unwrap().is_some());

        match db.create_branch("feature-a", None, &now_rfc3339()) {
            Err(Error::DuplicateBranch { name }) => assert_eq!(name, "feature-a"),
            other => panic!("expected DuplicateBranch, got {other:?}"),
        }

        match db.create_branch("  ", None, &now_rfc3339()) {
            Err(Error::InvalidArgument(_)) => {}
            other => panic!("expected InvalidArgument, got {other:?}"),
        }

        match db.update_branch_head("missing", None) {
            Err(Error::BranchNotFound { name }) => assert_eq!(name, "missing"),
            other => panic!("expected BranchNotFound, got {other:?}"),
        }

        // main is seeded by migrations, so two rows exist.
        assert_eq!(db.list_branches().unwrap().len(), 2);
    }

    #[test]
    fn test_list_cells_by_branch_filters() {
        let mut db = Database::open_memory().unwrap();
        for branch in ["main", "main", "feature-a"] {
            let seq = db.allocate_sequence().unwrap();
            let cell = test_cell(seq, branch);
            db.insert_cell_and_advance_branch(&cell, &[]).unwrap();
        }

        assert_eq!(db.list_cells_by_branch("main", 10).unwrap().len(), 2);
        assert_eq!(db.list_cells_by_branch("feature-a", 10).unwrap().len(), 1);
        assert_eq!(db.list_cells(0).unwrap().len(), 3);

        let latest = db.latest_cell_by_branch("main").unwrap().unwrap();
        assert_eq!(latest.sequence, 2);
        assert_eq!(db.latest_cell().unwrap().unwrap().sequence, 3);
    }

    #[test]
    fn test_meta_roundtrip() {
        let mut db = Database::open_memory().unwrap();
        assert!(db.get_meta("missing").unwrap().is_none());
        db.set_meta("active_branch", "feature-a").unwrap();
        assert_eq!(
            db.get_meta("active_branch").unwrap().as_deref(),
            Some("feature-a")
        );
    }
}
