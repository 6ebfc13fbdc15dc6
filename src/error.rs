//! Error types for Converge.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=storage, 3=not_found, 4=validation, etc.)
//! - Retryability flags for agent self-correction
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use thiserror::Error;

/// Result type alias for Converge operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Agents match on the string; shell scripts on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Storage (exit 2)
    NotInitialized,
    StorageError,
    Conflict,

    // Not Found (exit 3)
    CellNotFound,
    BranchNotFound,
    ObjectMissing,
    AgentRunNotFound,

    // Validation (exit 4)
    InvalidArgument,
    EmptyBranch,
    DuplicateBranch,

    // Evaluation (exit 5)
    EvalFailure,

    // Watcher (exit 6)
    WatchError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::StorageError => "STORAGE_ERROR",
            Self::Conflict => "CONFLICT",
            Self::CellNotFound => "CELL_NOT_FOUND",
            Self::BranchNotFound => "BRANCH_NOT_FOUND",
            Self::ObjectMissing => "OBJECT_MISSING",
            Self::AgentRunNotFound => "AGENT_RUN_NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::EmptyBranch => "EMPTY_BRANCH",
            Self::DuplicateBranch => "DUPLICATE_BRANCH",
            Self::EvalFailure => "EVAL_FAILURE",
            Self::WatchError => "WATCH_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-6).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::StorageError | Self::Conflict => 2,
            Self::CellNotFound
            | Self::BranchNotFound
            | Self::ObjectMissing
            | Self::AgentRunNotFound => 3,
            Self::InvalidArgument | Self::EmptyBranch | Self::DuplicateBranch => 4,
            Self::EvalFailure => 5,
            Self::WatchError => 6,
        }
    }

    /// Whether the caller should retry.
    ///
    /// True for validation errors (corrected input may succeed) and for
    /// busy-timeout conflicts (the competing transaction will finish).
    /// False for not-found, I/O, or internal errors.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument | Self::DuplicateBranch | Self::Conflict
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in Converge operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("not a converge repository (run `converge init` first)")]
    NotInitialized,

    #[error("cell not found: {id}")]
    CellNotFound { id: String },

    #[error("branch not found: {name}")]
    BranchNotFound { name: String },

    #[error("branch {name:?} has no head cell to restore")]
    EmptyBranch { name: String },

    #[error("branch {name:?} already exists")]
    DuplicateBranch { name: String },

    #[error("object not found: {hash}")]
    ObjectMissing { hash: String },

    #[error("agent run not found: {run_id}")]
    AgentRunNotFound { run_id: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("database is busy; a concurrent transaction timed out")]
    Conflict,

    #[error("database error: {0}")]
    Database(rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("watcher error: {0}")]
    Watch(String),

    #[error("evaluation failed: {0}")]
    Eval(String),

    #[error("{0}")]
    Other(String),
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        // A busy-timeout expiry is a retryable conflict, not a storage fault.
        if let rusqlite::Error::SqliteFailure(err, _) = &e {
            if err.code == rusqlite::ErrorCode::DatabaseBusy
                || err.code == rusqlite::ErrorCode::DatabaseLocked
            {
                return Self::Conflict;
            }
        }
        Self::Database(e)
    }
}

impl From<notify::Error> for Error {
    fn from(e: notify::Error) -> Self {
        Self::Watch(e.to_string())
    }
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::CellNotFound { .. } => ErrorCode::CellNotFound,
            Self::BranchNotFound { .. } => ErrorCode::BranchNotFound,
            Self::EmptyBranch { .. } => ErrorCode::EmptyBranch,
            Self::DuplicateBranch { .. } => ErrorCode::DuplicateBranch,
            Self::ObjectMissing { .. } => ErrorCode::ObjectMissing,
            Self::AgentRunNotFound { .. } => ErrorCode::AgentRunNotFound,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Conflict => ErrorCode::Conflict,
            Self::Database(_) | Self::Io(_) => ErrorCode::StorageError,
            Self::Watch(_) => ErrorCode::WatchError,
            Self::Eval(_) => ErrorCode::EvalFailure,
            Self::Json(_) | Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint for agents and humans.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => {
                Some("Run `converge init` to initialize the repository".to_string())
            }
            Self::CellNotFound { id } => Some(format!(
                "No cell with id '{id}'. Use `converge log` to see recent cells."
            )),
            Self::BranchNotFound { name } => Some(format!(
                "No branch named '{name}'. Use `converge branches` to list branches."
            )),
            Self::EmptyBranch { name } => Some(format!(
                "Branch '{name}' has no cells yet. Create one with `converge snap -m \"message\"`."
            )),
            Self::DuplicateBranch { .. } => {
                Some("Pick a different branch name or switch to the existing one.".to_string())
            }
            Self::Conflict => {
                Some("Another converge process held the database; retry the command.".to_string())
            }
            _ => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint. Agents parse this instead of stderr text.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
