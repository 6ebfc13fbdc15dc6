//! The cell pipeline and branch manager.
//!
//! `Service` composes the metadata database, blob store, snapshotter, and
//! an optional evaluator over one project directory. All captures flow
//! through [`Service::create_cell`] / [`Service::create_cell_if_changed`]:
//! snapshot, equality short-circuit, sequence allocation, statistics, then
//! one atomic insert that advances the branch head.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{self, now_rfc3339, DEFAULT_BRANCH};
use crate::error::{Error, Result};
use crate::eval::loc::count_loc;
use crate::eval::runner::{EvalResult, Evaluator};
use crate::snapshot::{self, Manifest, Snapshotter};
use crate::storage::{manifest_hashes, Branch, Cell, Database, ManifestEntry};
use crate::store::BlobStore;

use super::types::{cell_id, SnapOptions, WorkingTreeDelta};

/// The versioning engine for one project directory.
pub struct Service {
    pub db: Database,
    pub store: BlobStore,
    snapshotter: Snapshotter,
    evaluator: Option<Box<dyn Evaluator>>,
    project_dir: PathBuf,
}

/// Create the `.converge` state directory, the object store, and the
/// metadata database for a project.
///
/// Safe to call on an already-initialized project.
///
/// # Errors
///
/// Returns an error if the directories or database cannot be created.
pub fn init_repository(project_dir: &Path) -> Result<()> {
    fs::create_dir_all(config::objects_dir(project_dir))?;
    Database::open(&config::db_path(project_dir))?;
    Ok(())
}

impl Service {
    /// Open the engine for an initialized project directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] when the state directory is
    /// missing, or a storage error if the database cannot be opened.
    pub fn open(project_dir: impl Into<PathBuf>) -> Result<Self> {
        let project_dir = project_dir.into();
        let state_dir = config::state_dir(&project_dir);
        if !state_dir.is_dir() {
            return Err(Error::NotInitialized);
        }
        let db = Database::open(&config::db_path(&project_dir))?;
        let store = BlobStore::new(config::objects_dir(&project_dir));
        let snapshotter = Snapshotter::new(store.clone());
        Ok(Self {
            db,
            store,
            snapshotter,
            evaluator: None,
            project_dir,
        })
    }

    /// Attach an evaluator collaborator.
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: Box<dyn Evaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// The project directory this engine operates on.
    #[must_use]
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Name of the active branch.
    ///
    /// Defaults to (and persists) `main` when unset, and guarantees a
    /// branch row exists for the returned name.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    pub fn active_branch(&mut self) -> Result<String> {
        let stored = self.db.get_meta("active_branch")?;
        let branch = match stored {
            Some(value) if !value.trim().is_empty() => value.trim().to_string(),
            _ => {
                self.db.set_meta("active_branch", DEFAULT_BRANCH)?;
                DEFAULT_BRANCH.to_string()
            }
        };
        self.ensure_branch_exists(&branch)?;
        Ok(branch)
    }

    /// Create a new branch whose head is the active branch's current head.
    ///
    /// With `switch_now` the new branch also becomes active (the working
    /// tree is untouched: both branches point at the same head).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a blank name and
    /// [`Error::DuplicateBranch`] when the name is taken.
    pub fn fork_branch(&mut self, name: &str, switch_now: bool) -> Result<Branch> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidArgument("branch name cannot be empty".to_string()));
        }
        if name.eq_ignore_ascii_case(DEFAULT_BRANCH)
            && self.db.get_branch(DEFAULT_BRANCH)?.is_some()
        {
            return Err(Error::DuplicateBranch { name: DEFAULT_BRANCH.to_string() });
        }

        let active = self.active_branch()?;
        let head = self.branch_head_cell(&active)?;
        let head_id = head.map(|c| c.id);

        self.db.create_branch(name, head_id.as_deref(), &now_rfc3339())?;

        if switch_now {
            self.db.set_meta("active_branch", name)?;
            self.set_head_cell_meta(head_id.as_deref())?;
        }

        self.db
            .get_branch(name)?
            .ok_or_else(|| Error::BranchNotFound { name: name.to_string() })
    }

    /// Switch the working tree and active branch to another branch.
    ///
    /// Switching to the already-active branch is a no-op that returns
    /// `(None, head)`. Otherwise: safety snapshot on the current branch,
    /// restore-lock write, tracked-file restore to the target head, then
    /// the active-branch/head-cell swap. Returns the safety cell and the
    /// target head.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BranchNotFound`] for an unknown name and
    /// [`Error::EmptyBranch`] when the target has no head cell.
    pub fn switch_branch(&mut self, name: &str) -> Result<(Option<Cell>, Cell)> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidArgument("branch name cannot be empty".to_string()));
        }
        let branch = self
            .db
            .get_branch(name)?
            .ok_or_else(|| Error::BranchNotFound { name: name.to_string() })?;
        let head_id = match branch.head_cell_id {
            Some(ref id) if !id.trim().is_empty() => id.clone(),
            _ => return Err(Error::EmptyBranch { name: name.to_string() }),
        };

        let active = self.active_branch()?;
        if active == name {
            let target = self
                .db
                .get_cell(&head_id)?
                .ok_or_else(|| Error::CellNotFound { id: head_id.clone() })?;
            return Ok((None, target));
        }

        let current_head = self.branch_head_cell(&active)?;

        let safety = self.create_cell(&SnapOptions {
            message: format!("safety snapshot before switch to {name}"),
            source: "restore_safety".to_string(),
            run_eval: false,
            ..SnapOptions::default()
        })?;

        {
            let _lock = self.write_restore_lock()?;
            self.restore_tracked_files_to(&head_id, current_head.as_ref())?;
        }

        self.db.set_meta("active_branch", name)?;
        self.set_head_cell_meta(Some(&head_id))?;

        let target = self
            .db
            .get_cell(&head_id)?
            .ok_or_else(|| Error::CellNotFound { id: head_id })?;
        Ok((Some(safety), target))
    }

    /// Unconditionally capture the working tree into a new cell.
    ///
    /// # Errors
    ///
    /// Returns an error if the capture or the insert fails. Evaluation
    /// failures are absorbed into the cell's eval slot.
    pub fn create_cell(&mut self, opts: &SnapOptions) -> Result<Cell> {
        let manifest = self.snapshotter.capture(&self.project_dir)?;
        self.create_cell_from_manifest(&manifest, opts, None, None)
    }

    /// Capture the working tree, short-circuiting to `(None, false)` when
    /// the tree is hash-equal to the active branch head's manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the capture or the insert fails.
    pub fn create_cell_if_changed(&mut self, opts: &SnapOptions) -> Result<(Option<Cell>, bool)> {
        let manifest = self.snapshotter.capture(&self.project_dir)?;

        let branch = self.active_branch()?;
        let parent = self.branch_head_cell(&branch)?;

        let mut parent_entries = None;
        if let Some(ref parent) = parent {
            let entries = self.db.get_manifest(&parent.id)?;
            let parent_map = manifest_hashes(&entries);
            if snapshot::equal_to_entries(&manifest, &parent_map) {
                return Ok((None, false));
            }
            parent_entries = Some(entries);
        }

        let cell =
            self.create_cell_from_manifest(&manifest, opts, parent.as_ref(), parent_entries)?;
        Ok((Some(cell), true))
    }

    fn create_cell_from_manifest(
        &mut self,
        manifest: &Manifest,
        opts: &SnapOptions,
        known_parent: Option<&Cell>,
        known_parent_manifest: Option<Vec<ManifestEntry>>,
    ) -> Result<Cell> {
        let branch = self.active_branch()?;

        let sequence = self.db.allocate_sequence()?;
        let id = cell_id(sequence);

        let parent = match known_parent {
            Some(parent) => Some(parent.clone()),
            None => self.branch_head_cell(&branch)?,
        };
        let parent_entries = match (parent.as_ref(), known_parent_manifest) {
            (Some(_), Some(entries)) => entries,
            (Some(parent), None) => self.db.get_manifest(&parent.id)?,
            (None, _) => Vec::new(),
        };

        let stats = compute_diff_stats(manifest, &parent_entries, &self.store);
        let (total_loc, total_files) = compute_loc(manifest, &self.store);
        let loc_delta = match parent.as_ref() {
            Some(parent) => total_loc - parent.total_loc,
            None => total_loc,
        };

        let source = if opts.source.trim().is_empty() {
            "manual".to_string()
        } else {
            opts.source.trim().to_string()
        };
        let agent = non_blank(&opts.agent);
        let tags = non_blank(&opts.tags);

        let cell = Cell {
            id: id.clone(),
            sequence,
            parent_id: parent.as_ref().map(|p| p.id.clone()),
            timestamp: now_rfc3339(),
            message: opts.message.clone(),
            source,
            agent,
            tags,
            branch,
            files_added: stats.added,
            files_modified: stats.modified,
            files_removed: stats.removed,
            lines_added: stats.lines_added,
            lines_removed: stats.lines_removed,
            total_loc,
            loc_delta,
            total_files,
            eval_requested: opts.run_eval,
            eval_ran: false,
            tests_passed: None,
            tests_failed: None,
            lint_errors: None,
            type_errors: None,
            eval_skipped: None,
            eval_error: None,
        };

        let entries: Vec<ManifestEntry> = manifest
            .iter()
            .map(|(path, fe)| ManifestEntry {
                cell_id: id.clone(),
                path: path.clone(),
                hash: fe.hash.clone(),
                mode: i64::from(fe.mode),
                size: fe.size as i64,
            })
            .collect();

        self.db.insert_cell_and_advance_branch(&cell, &entries)?;

        if opts.run_eval {
            if let Err(eval_err) = self.evaluate_cell(&id) {
                // Evaluation is best-effort; persist the failure text and
                // keep the inserted cell.
                self.db
                    .update_cell_eval(&id, None, None, None, None, None, Some(&eval_err.to_string()))?;
            }
        }

        self.db
            .get_cell(&id)?
            .ok_or(Error::CellNotFound { id })
    }

    /// Run the evaluator against the project and fill the cell's eval slot.
    ///
    /// The slot is written even when the evaluator fails (error text plus
    /// whatever counts exist).
    ///
    /// # Errors
    ///
    /// Returns [`Error::CellNotFound`] for an unknown cell,
    /// [`Error::Eval`] when no evaluator is configured or the run failed.
    pub fn evaluate_cell(&mut self, cell_id: &str) -> Result<EvalResult> {
        if self.db.get_cell(cell_id)?.is_none() {
            return Err(Error::CellNotFound { id: cell_id.to_string() });
        }
        let Some(evaluator) = self.evaluator.as_deref() else {
            return Err(Error::Eval("evaluator is not configured".to_string()));
        };

        let (result, run_err) = match evaluator.run(&self.project_dir) {
            Ok(result) => (result, None),
            Err(e) => (EvalResult::default(), Some(e.to_string())),
        };

        self.db.update_cell_eval(
            cell_id,
            result.tests_passed_opt(),
            result.tests_failed_opt(),
            result.lint_errors_opt(),
            result.type_errors_opt(),
            result.skipped_opt().as_deref(),
            run_err.as_deref(),
        )?;

        match run_err {
            Some(text) => Err(Error::Eval(text)),
            None => Ok(result),
        }
    }

    /// Compare the current working tree to the active branch head.
    ///
    /// Returns the head cell (None when the branch is empty) and the
    /// added/modified/removed counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the capture or a lookup fails.
    pub fn working_tree_delta(&mut self) -> Result<(Option<Cell>, WorkingTreeDelta)> {
        let branch = self.active_branch()?;
        let Some(latest) = self.branch_head_cell(&branch)? else {
            return Ok((None, WorkingTreeDelta::default()));
        };

        let manifest = self.snapshotter.capture(&self.project_dir)?;
        let latest_entries = self.db.get_manifest(&latest.id)?;
        let latest_map = manifest_hashes(&latest_entries);

        let mut delta = WorkingTreeDelta::default();
        for (path, entry) in &manifest {
            match latest_map.get(path) {
                None => delta.added += 1,
                Some(hash) if hash != &entry.hash => delta.modified += 1,
                Some(_) => {}
            }
        }
        for path in latest_map.keys() {
            if !manifest.contains_key(path) {
                delta.removed += 1;
            }
        }

        Ok((Some(latest), delta))
    }

    /// Head cell of a branch, or `None` for a missing branch, null head,
    /// or dangling head reference.
    pub(crate) fn branch_head_cell(&self, branch: &str) -> Result<Option<Cell>> {
        let Some(record) = self.db.get_branch(branch)? else {
            return Ok(None);
        };
        let Some(head_id) = record.head_cell_id.filter(|id| !id.trim().is_empty()) else {
            return Ok(None);
        };
        self.db.get_cell(&head_id)
    }

    pub(crate) fn set_head_cell_meta(&mut self, head_cell_id: Option<&str>) -> Result<()> {
        self.db.set_meta("head_cell", head_cell_id.unwrap_or(""))
    }

    fn ensure_branch_exists(&mut self, branch: &str) -> Result<()> {
        if self.db.get_branch(branch)?.is_some() {
            return Ok(());
        }
        let head = self.db.latest_cell_by_branch(branch)?;
        let head_id = head.map(|c| c.id);
        self.db.create_branch(branch, head_id.as_deref(), &now_rfc3339())
    }
}

/// File and line deltas of a manifest relative to its parent manifest.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct DiffStats {
    pub added: i64,
    pub modified: i64,
    pub removed: i64,
    pub lines_added: i64,
    pub lines_removed: i64,
}

/// Classify files against the parent and account line deltas from whole-
/// file newline counts: added/removed files contribute their full count,
/// modified files the signed difference of their counts.
pub(crate) fn compute_diff_stats(
    current: &Manifest,
    parent_entries: &[ManifestEntry],
    store: &BlobStore,
) -> DiffStats {
    let parent_map: BTreeMap<String, String> = manifest_hashes(parent_entries);
    let mut stats = DiffStats::default();

    for (path, entry) in current {
        match parent_map.get(path) {
            None => {
                stats.added += 1;
                if let Ok(data) = store.read(&entry.hash) {
                    stats.lines_added += count_lines(&data);
                }
            }
            Some(old_hash) if old_hash != &entry.hash => {
                stats.modified += 1;
                let new_lines = store.read(&entry.hash).map(|d| count_lines(&d)).unwrap_or(0);
                let old_lines = store.read(old_hash).map(|d| count_lines(&d)).unwrap_or(0);
                if new_lines >= old_lines {
                    stats.lines_added += new_lines - old_lines;
                } else {
                    stats.lines_removed += old_lines - new_lines;
                }
            }
            Some(_) => {}
        }
    }

    for entry in parent_entries {
        if !current.contains_key(&entry.path) {
            stats.removed += 1;
            if let Ok(data) = store.read(&entry.hash) {
                stats.lines_removed += count_lines(&data);
            }
        }
    }

    stats
}

/// Total LOC and file count over a manifest, reading blob bytes in sorted
/// path order. Unreadable blobs are skipped.
pub(crate) fn compute_loc(manifest: &Manifest, store: &BlobStore) -> (i64, i64) {
    let mut total_loc = 0;
    for (path, entry) in manifest {
        let Ok(data) = store.read(&entry.hash) else {
            continue;
        };
        total_loc += count_loc(path, &String::from_utf8_lossy(&data));
    }
    (total_loc, manifest.len() as i64)
}

/// Newline-terminated record count with the trailing newline absorbed:
/// `"a\nb\n"` is 2 lines, `"a\nb"` is also 2.
pub(crate) fn count_lines(data: &[u8]) -> i64 {
    if data.is_empty() {
        return 0;
    }
    let mut count = 1;
    for byte in data {
        if *byte == b'\n' {
            count += 1;
        }
    }
    if data[data.len() - 1] == b'\n' {
        count -= 1;
    }
    count
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
