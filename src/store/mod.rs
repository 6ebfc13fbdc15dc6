//! Content-addressed blob store.
//!
//! Blobs are stored under `.converge/objects/` using a 2-character prefix
//! directory scheme. Each blob is named by the lowercase hex SHA-256 of its
//! bytes and written read-only (0444), so identical content is stored once
//! and repeated writes cost only a stat.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Content-addressed store of raw file blobs.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Create a store rooted at the given objects directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store bytes and return their content hash.
    ///
    /// If a blob with the same content already exists this is a no-op that
    /// returns the existing hash. New blobs are written to a temporary
    /// sibling and renamed into place so readers never observe a partial
    /// object.
    ///
    /// # Errors
    ///
    /// Returns an error if the shard directory or blob cannot be written.
    pub fn write(&self, data: &[u8]) -> Result<String> {
        let hash = hash_bytes(data);
        if self.has(&hash) {
            return Ok(hash);
        }

        let path = self.blob_path(&hash);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Unique temp name so concurrent writers of identical content
        // never interleave on one file; the rename is the commit point.
        static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);
        let tmp = path.with_extension(format!(
            "tmp.{}.{}",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp, data)?;
        set_read_only(&tmp)?;
        fs::rename(&tmp, &path)?;
        Ok(hash)
    }

    /// Retrieve a blob by its hash.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ObjectMissing`] if no blob with that hash exists.
    pub fn read(&self, hash: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(hash);
        match fs::read(&path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::ObjectMissing { hash: hash.to_string() })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Check whether a blob exists.
    #[must_use]
    pub fn has(&self, hash: &str) -> bool {
        self.blob_path(hash).exists()
    }

    /// Filesystem path for a blob hash: `ab/abcdef...`.
    fn blob_path(&self, hash: &str) -> PathBuf {
        if hash.len() < 2 {
            return self.root.join(hash);
        }
        self.root.join(&hash[..2]).join(hash)
    }
}

/// Lowercase hex SHA-256 of the given bytes.
#[must_use]
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(unix)]
fn set_read_only(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o444))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_read_only(path: &Path) -> Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(true);
    fs::set_permissions(path, perms)?;
    Ok(())
}
