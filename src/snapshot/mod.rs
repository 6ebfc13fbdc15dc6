//! Working-tree snapshotter.
//!
//! Walks the project directory, applies the ignore policy, writes each
//! file's bytes into the blob store, and returns a manifest mapping
//! relative paths (forward slashes) to their content hash, mode, and size.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::config;
use crate::error::{Error, Result};
use crate::store::BlobStore;

/// One captured file: blob hash, permission bits, and byte size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub hash: String,
    pub mode: u32,
    pub size: u64,
}

/// Captured working-tree state: relative path (forward slashes) to entry.
pub type Manifest = BTreeMap<String, FileEntry>;

/// Captures working-tree snapshots into a blob store.
#[derive(Debug, Clone)]
pub struct Snapshotter {
    store: BlobStore,
}

impl Snapshotter {
    #[must_use]
    pub fn new(store: BlobStore) -> Self {
        Self { store }
    }

    /// Walk the project tree and capture every tracked file.
    ///
    /// Ignored directories are pruned whole; ignored files and symbolic
    /// links are skipped. Any read or store failure aborts the capture.
    ///
    /// # Errors
    ///
    /// Returns an error if the walk, a file read, or a blob write fails.
    pub fn capture(&self, project_dir: &Path) -> Result<Manifest> {
        let mut manifest = Manifest::new();

        let walker = WalkDir::new(project_dir).into_iter().filter_entry(|e| {
            // The project root itself is never skipped.
            if e.depth() == 0 {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            if e.file_type().is_dir() {
                !config::is_ignored_dir(&name)
            } else {
                true
            }
        });

        for entry in walker {
            let entry =
                entry.map_err(|e| Error::Other(format!("walk project: {e}")))?;
            if entry.file_type().is_dir() {
                continue;
            }
            if entry.file_type().is_symlink() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if config::is_ignored_file(&name) {
                continue;
            }

            let rel_path = entry
                .path()
                .strip_prefix(project_dir)
                .map_err(|e| Error::Other(format!("relative path for {}: {e}", entry.path().display())))?;
            let rel_path = to_slash(rel_path);

            let data = fs::read(entry.path())
                .map_err(|e| Error::Other(format!("read {rel_path}: {e}")))?;
            let hash = self
                .store
                .write(&data)
                .map_err(|e| Error::Other(format!("store {rel_path}: {e}")))?;
            let meta = entry
                .metadata()
                .map_err(|e| Error::Other(format!("stat {rel_path}: {e}")))?;

            manifest.insert(
                rel_path,
                FileEntry {
                    hash,
                    mode: file_mode(&meta),
                    size: meta.len(),
                },
            );
        }

        Ok(manifest)
    }
}

/// Whether a captured manifest equals a stored `(path -> hash)` mapping:
/// same set of paths and matching hashes.
#[must_use]
pub fn equal_to_entries(manifest: &Manifest, entries: &BTreeMap<String, String>) -> bool {
    if manifest.len() != entries.len() {
        return false;
    }
    manifest
        .iter()
        .all(|(path, entry)| entries.get(path).is_some_and(|h| h == &entry.hash))
}

/// Whether bytes look like text: empty or free of NUL bytes.
#[must_use]
pub fn is_text(data: &[u8]) -> bool {
    !data.contains(&0)
}

/// Permission bits of a captured file (0o644 off Unix).
#[cfg(unix)]
fn file_mode(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn file_mode(_meta: &fs::Metadata) -> u32 {
    0o644
}

fn to_slash(path: &Path) -> String {
    let s = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        s.into_owned()
    } else {
        s.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_capture_basic() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.go"), "package main\n").unwrap();
        fs::create_dir(dir.path().join("pkg")).unwrap();
        fs::write(dir.path().join("pkg").join("util.go"), "package pkg\n").unwrap();

        let snap = Snapshotter::new(BlobStore::new(
            dir.path().join(".converge").join("objects"),
        ));
        let manifest = snap.capture(dir.path()).unwrap();
        assert_eq!(manifest.len(), 2);
        assert!(manifest.contains_key("main.go"));
        assert!(manifest.contains_key("pkg/util.go"));
        assert_eq!(manifest["main.go"].size, 13);
        assert_eq!(manifest["main.go"].hash.len(), 64);
    }

    #[test]
    fn test_capture_ignores_state_and_vendor_dirs() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a\n").unwrap();
        for ignored in [".converge", ".git", "node_modules", "__pycache__"] {
            let sub = dir.path().join(ignored);
            fs::create_dir_all(&sub).unwrap();
            fs::write(sub.join("junk"), "junk").unwrap();
        }
        fs::write(dir.path().join(".DS_Store"), "meta").unwrap();

        let snap = Snapshotter::new(BlobStore::new(
            dir.path().join(".converge").join("objects"),
        ));
        let manifest = snap.capture(dir.path()).unwrap();
        assert_eq!(manifest.len(), 1);
        assert!(manifest.contains_key("a.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_capture_skips_symlinks() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("real.txt"), "real\n").unwrap();
        std::os::unix::fs::symlink(dir.path().join("real.txt"), dir.path().join("link.txt"))
            .unwrap();

        let snap = Snapshotter::new(BlobStore::new(
            dir.path().join(".converge").join("objects"),
        ));
        let manifest = snap.capture(dir.path()).unwrap();
        assert_eq!(manifest.len(), 1);
        assert!(manifest.contains_key("real.txt"));
    }

    #[test]
    fn test_capture_is_deterministic() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("x.py"), "print('x')\n").unwrap();
        fs::write(dir.path().join("y.py"), "print('y')\n").unwrap();

        let snap = Snapshotter::new(BlobStore::new(
            dir.path().join(".converge").join("objects"),
        ));
        let first = snap.capture(dir.path()).unwrap();
        let second = snap.capture(dir.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_equal_to_entries() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a\n").unwrap();

        let snap = Snapshotter::new(BlobStore::new(
            dir.path().join(".converge").join("objects"),
        ));
        let manifest = snap.capture(dir.path()).unwrap();

        let mut stored: BTreeMap<String, String> = manifest
            .iter()
            .map(|(p, e)| (p.clone(), e.hash.clone()))
            .collect();
        assert!(equal_to_entries(&manifest, &stored));

        stored.insert("a.txt".into(), "different".into());
        assert!(!equal_to_entries(&manifest, &stored));

        stored.remove("a.txt");
        assert!(!equal_to_entries(&manifest, &stored));
    }

    #[test]
    fn test_is_text() {
        assert!(is_text(b""));
        assert!(is_text(b"plain text\n"));
        assert!(!is_text(b"bin\x00ary"));
    }
}
