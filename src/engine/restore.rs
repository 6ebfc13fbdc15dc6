//! The restore protocol.
//!
//! Restoring a cell mutates the working tree, so ordering is strict:
//! safety snapshot first (on the current branch), then the visible lock
//! file, then tracked-file materialization/removal, and only after that
//! the branch-head rewind. The lock is an RAII guard removed on every
//! exit path of the operation that created it.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config;
use crate::error::{Error, Result};
use crate::storage::Cell;

use super::service::Service;
use super::types::SnapOptions;

/// Advisory restore-in-progress marker. Dropping the guard removes the
/// lock file; a hard crash leaves it behind for the user to clear.
pub(crate) struct RestoreLock {
    path: PathBuf,
}

impl Drop for RestoreLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

impl Service {
    /// Restore the working tree to a target cell.
    ///
    /// Sequence: verify the target, record the current branch head, create
    /// a safety snapshot (advancing the current head), write the restore
    /// lock, materialize the target manifest and remove tracked files
    /// absent from it, rewind the active branch head to the target, update
    /// the `head_cell` meta. Returns the safety cell.
    ///
    /// Untracked files (in neither manifest) are never touched, so the
    /// next capture on this branch records `parent_id = target`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CellNotFound`] for an unknown target, or a storage
    /// error from any step; the lock is removed on all exit paths.
    pub fn restore_cell(&mut self, target_id: &str) -> Result<Cell> {
        if self.db.get_cell(target_id)?.is_none() {
            return Err(Error::CellNotFound { id: target_id.to_string() });
        }

        let active_branch = self.active_branch()?;
        let latest_before_restore = self.db.latest_cell_by_branch(&active_branch)?;

        let safety = self.create_cell(&SnapOptions {
            message: format!("safety snapshot before restore to {target_id}"),
            source: "restore_safety".to_string(),
            run_eval: false,
            ..SnapOptions::default()
        })?;

        {
            let _lock = self.write_restore_lock()?;
            self.restore_tracked_files_to(target_id, latest_before_restore.as_ref())?;
        }

        match self.db.update_branch_head(&active_branch, Some(target_id)) {
            Ok(()) => {}
            Err(Error::BranchNotFound { .. }) => {
                self.db
                    .create_branch(&active_branch, Some(target_id), &safety.timestamp)?;
            }
            Err(e) => return Err(e),
        }
        self.set_head_cell_meta(Some(target_id))?;

        Ok(safety)
    }

    /// Materialize the target cell's manifest into the working tree and
    /// remove files tracked by `current_tracked_head` that the target does
    /// not contain. Files in neither manifest are left alone; removing an
    /// already-missing file is not an error.
    pub(crate) fn restore_tracked_files_to(
        &self,
        target_id: &str,
        current_tracked_head: Option<&Cell>,
    ) -> Result<()> {
        let target_manifest = self.db.get_manifest(target_id)?;

        let current_tracked_manifest = match current_tracked_head {
            Some(head) => self.db.get_manifest(&head.id)?,
            None => Vec::new(),
        };

        let mut target_paths = std::collections::HashSet::with_capacity(target_manifest.len());
        for entry in &target_manifest {
            target_paths.insert(entry.path.clone());
            let data = self.store.read(&entry.hash)?;
            let full_path = self.project_dir().join(&entry.path);
            if let Some(parent) = full_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&full_path, &data)?;
            apply_mode(&full_path, entry.mode)?;
        }

        for entry in &current_tracked_manifest {
            if target_paths.contains(&entry.path) {
                continue;
            }
            let full_path = self.project_dir().join(&entry.path);
            match fs::remove_file(&full_path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    /// Create `.converge/restore.lock` and return its removal guard.
    pub(crate) fn write_restore_lock(&self) -> Result<RestoreLock> {
        let state_dir = config::state_dir(self.project_dir());
        fs::create_dir_all(&state_dir)?;
        let path = config::restore_lock_path(self.project_dir());
        fs::write(&path, b"restoring")?;
        Ok(RestoreLock { path })
    }

    /// Whether a restore or switch currently holds the advisory lock.
    #[must_use]
    pub fn is_restore_in_progress(&self) -> bool {
        config::restore_lock_path(self.project_dir()).exists()
    }
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: i64) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let bits = u32::try_from(mode).unwrap_or(0o644) & 0o777;
    if bits != 0 {
        fs::set_permissions(path, fs::Permissions::from_mode(bits))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: i64) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::service::{init_repository, Service};
    use super::*;
    use tempfile::TempDir;

    fn new_project() -> (TempDir, Service) {
        let dir = TempDir::new().unwrap();
        init_repository(dir.path()).unwrap();
        let svc = Service::open(dir.path()).unwrap();
        (dir, svc)
    }

    fn snap(message: &str) -> SnapOptions {
        SnapOptions {
            message: message.to_string(),
            ..SnapOptions::default()
        }
    }

    #[test]
    fn test_restore_round_trip() {
        // S5: untracked files survive, tracked-missing files are removed.
        let (dir, mut svc) = new_project();
        fs::write(dir.path().join("main.go"), "package main\n").unwrap();
        let c1 = svc.create_cell(&snap("first")).unwrap();

        fs::write(dir.path().join("helper.go"), "package main\nfunc helper() {}\n").unwrap();
        svc.create_cell(&snap("second")).unwrap();

        // Untracked scratch file, never captured.
        fs::write(dir.path().join("notes.tmp"), "scratch\n").unwrap();

        let safety = svc.restore_cell(&c1.id).unwrap();
        assert_eq!(safety.source, "restore_safety");

        assert!(!dir.path().join("helper.go").exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("notes.tmp")).unwrap(),
            "scratch\n"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("main.go")).unwrap(),
            "package main\n"
        );

        let main = svc.db.get_branch("main").unwrap().unwrap();
        assert_eq!(main.head_cell_id.as_deref(), Some(c1.id.as_str()));
        assert_eq!(
            svc.db.get_meta("head_cell").unwrap().as_deref(),
            Some(c1.id.as_str())
        );

        // The next capture on this branch descends from the restored
        // target, not from the safety cell.
        fs::write(dir.path().join("main.go"), "package main\n// edited\n").unwrap();
        let next = svc.create_cell(&snap("after restore")).unwrap();
        assert_eq!(next.parent_id.as_deref(), Some(c1.id.as_str()));
    }

    #[test]
    fn test_restore_missing_cell() {
        let (_dir, mut svc) = new_project();
        assert!(matches!(
            svc.restore_cell("c_000404"),
            Err(Error::CellNotFound { .. })
        ));
    }

    #[test]
    fn test_restore_creates_safety_cell_first() {
        let (dir, mut svc) = new_project();
        fs::write(dir.path().join("a.txt"), "v1\n").unwrap();
        let c1 = svc.create_cell(&snap("v1")).unwrap();
        fs::write(dir.path().join("a.txt"), "v2\n").unwrap();
        svc.create_cell(&snap("v2")).unwrap();

        // Uncommitted edit that only the safety snapshot will hold.
        fs::write(dir.path().join("a.txt"), "uncommitted\n").unwrap();
        let safety = svc.restore_cell(&c1.id).unwrap();

        let safety_manifest = svc.db.get_manifest(&safety.id).unwrap();
        let entry = safety_manifest.iter().find(|e| e.path == "a.txt").unwrap();
        let bytes = svc.store.read(&entry.hash).unwrap();
        assert_eq!(bytes, b"uncommitted\n");

        // Working tree was rewound after the safety snapshot.
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "v1\n");
    }

    #[test]
    fn test_restore_materializes_nested_paths() {
        let (dir, mut svc) = new_project();
        fs::create_dir_all(dir.path().join("pkg/deep")).unwrap();
        fs::write(dir.path().join("pkg/deep/mod.go"), "package deep\n").unwrap();
        let c1 = svc.create_cell(&snap("nested")).unwrap();

        fs::remove_file(dir.path().join("pkg/deep/mod.go")).unwrap();
        fs::remove_dir_all(dir.path().join("pkg")).unwrap();
        svc.create_cell(&snap("emptied")).unwrap();

        svc.restore_cell(&c1.id).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("pkg/deep/mod.go")).unwrap(),
            "package deep\n"
        );
    }

    #[test]
    fn test_lock_lifecycle() {
        let (dir, mut svc) = new_project();
        fs::write(dir.path().join("a.txt"), "v1\n").unwrap();
        let c1 = svc.create_cell(&snap("v1")).unwrap();

        assert!(!svc.is_restore_in_progress());
        svc.restore_cell(&c1.id).unwrap();
        assert!(!svc.is_restore_in_progress());

        // A manually-present lock is visible until cleared.
        fs::write(config::restore_lock_path(dir.path()), b"stale").unwrap();
        assert!(svc.is_restore_in_progress());
    }

    #[test]
    fn test_lock_removed_when_restore_fails() {
        let (dir, mut svc) = new_project();
        fs::write(dir.path().join("a.txt"), "v1\n").unwrap();
        let c1 = svc.create_cell(&snap("v1")).unwrap();

        // Corrupt the object store so materialization fails mid-restore.
        let manifest = svc.db.get_manifest(&c1.id).unwrap();
        let hash = &manifest[0].hash;
        let blob = config::objects_dir(dir.path()).join(&hash[..2]).join(hash);
        let mut perms = fs::metadata(&blob).unwrap().permissions();
        perms.set_readonly(false);
        fs::set_permissions(&blob, perms).unwrap();
        fs::remove_file(&blob).unwrap();

        fs::write(dir.path().join("a.txt"), "v2\n").unwrap();
        svc.create_cell(&snap("v2")).unwrap();

        assert!(svc.restore_cell(&c1.id).is_err());
        assert!(!svc.is_restore_in_progress());
    }
}
