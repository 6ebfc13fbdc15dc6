//! Repository layout constants and path helpers.
//!
//! All converge state lives under `.converge/` in the project root:
//! the metadata database, the content-addressed object store, and the
//! advisory restore lock.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};

/// Name of the per-project state directory.
pub const STATE_DIR_NAME: &str = ".converge";

/// Branch used when none has been chosen yet.
pub const DEFAULT_BRANCH: &str = "main";

/// Name of the object store directory inside the state directory.
pub const OBJECTS_DIR_NAME: &str = "objects";

/// Filename of the metadata database inside the state directory.
pub const DB_FILE_NAME: &str = "converge.db";

/// Filename of the advisory restore-in-progress marker.
pub const RESTORE_LOCK_NAME: &str = "restore.lock";

/// Directory base names never captured or watched.
pub const IGNORED_DIR_NAMES: &[&str] = &[STATE_DIR_NAME, ".git", "node_modules", "__pycache__"];

/// File base names never captured.
pub const IGNORED_FILE_NAMES: &[&str] = &[".DS_Store"];

/// Default quiet window before the watcher auto-captures.
pub const DEFAULT_WATCH_DEBOUNCE: Duration = Duration::from_secs(3);

/// Whether a directory base name is in the ignore set.
#[must_use]
pub fn is_ignored_dir(name: &str) -> bool {
    IGNORED_DIR_NAMES.contains(&name)
}

/// Whether a file base name is in the ignore set.
#[must_use]
pub fn is_ignored_file(name: &str) -> bool {
    IGNORED_FILE_NAMES.contains(&name)
}

/// `<project>/.converge`
#[must_use]
pub fn state_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(STATE_DIR_NAME)
}

/// `<project>/.converge/objects`
#[must_use]
pub fn objects_dir(project_dir: &Path) -> PathBuf {
    state_dir(project_dir).join(OBJECTS_DIR_NAME)
}

/// `<project>/.converge/converge.db`
#[must_use]
pub fn db_path(project_dir: &Path) -> PathBuf {
    state_dir(project_dir).join(DB_FILE_NAME)
}

/// `<project>/.converge/restore.lock`
#[must_use]
pub fn restore_lock_path(project_dir: &Path) -> PathBuf {
    state_dir(project_dir).join(RESTORE_LOCK_NAME)
}

/// Current UTC time as an RFC-3339 string with nanosecond precision,
/// e.g. `2026-02-28T00:00:00.000000000Z`. This is the timestamp format
/// for every persisted record.
#[must_use]
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}
