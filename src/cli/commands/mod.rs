//! Command implementations.

use std::path::{Path, PathBuf};

use crate::engine::Service;
use crate::error::Result;
use crate::eval::ToolRunner;

pub mod branches;
pub mod diff;
pub mod eval;
pub mod fork;
pub mod hook;
pub mod init;
pub mod log;
pub mod restore;
pub mod snap;
pub mod status;
pub mod switch;
pub mod watch;

/// Resolve the project directory: `--dir` when given, else the cwd.
pub fn project_dir(dir: Option<&PathBuf>) -> Result<PathBuf> {
    match dir {
        Some(path) => Ok(path.clone()),
        None => Ok(std::env::current_dir()?),
    }
}

/// Open the engine for a project with the standard tool evaluator.
pub fn open_service(project_dir: &Path) -> Result<Service> {
    Ok(Service::open(project_dir)?.with_evaluator(Box::new(ToolRunner::new())))
}
