//! `converge branches` - list branches and their heads.

use std::path::Path;

use colored::Colorize;
use serde::Serialize;

use crate::error::Result;
use crate::storage::Branch;

use super::open_service;

#[derive(Serialize)]
struct BranchesOutput<'a> {
    active_branch: &'a str,
    branches: &'a [Branch],
}

pub fn execute(project_dir: &Path, json: bool) -> Result<()> {
    let mut svc = open_service(project_dir)?;

    let active_branch = svc.active_branch()?;
    let branches = svc.db.list_branches()?;

    if json {
        let output = BranchesOutput {
            active_branch: &active_branch,
            branches: &branches,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if branches.is_empty() {
        println!("No branches found.");
        return Ok(());
    }

    for branch in &branches {
        let marker = if branch.name == active_branch { "*" } else { " " };
        let head = branch.head_cell_id.as_deref().unwrap_or("<empty>");
        if branch.name == active_branch {
            println!("{marker} {}  {head}", branch.name.green().bold());
        } else {
            println!("{marker} {}  {head}", branch.name);
        }
    }
    Ok(())
}
