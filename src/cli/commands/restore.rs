//! `converge restore` - restore the working tree to a cell.

use std::path::Path;

use serde::Serialize;

use crate::error::Result;

use super::open_service;

#[derive(Serialize)]
struct RestoreOutput<'a> {
    restored: &'a str,
    safety_cell: &'a str,
    branch: &'a str,
}

pub fn execute(project_dir: &Path, cell: &str, json: bool) -> Result<()> {
    let mut svc = open_service(project_dir)?;

    let safety = svc.restore_cell(cell)?;
    let branch = svc.active_branch()?;

    if json {
        let output = RestoreOutput {
            restored: cell,
            safety_cell: &safety.id,
            branch: &branch,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("Restored working tree to {cell} (branch {branch})");
    println!("Safety snapshot saved as {} before restoring", safety.id);
    Ok(())
}
