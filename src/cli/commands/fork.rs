//! `converge fork` - create a branch from the current head.

use std::path::Path;

use serde::Serialize;

use crate::error::Result;

use super::open_service;

#[derive(Serialize)]
struct ForkOutput<'a> {
    branch: &'a str,
    head_cell: Option<&'a str>,
    switched: bool,
}

pub fn execute(project_dir: &Path, name: &str, switch_now: bool, json: bool) -> Result<()> {
    let mut svc = open_service(project_dir)?;

    let branch = svc.fork_branch(name.trim(), switch_now)?;

    if json {
        let output = ForkOutput {
            branch: &branch.name,
            head_cell: branch.head_cell_id.as_deref(),
            switched: switch_now,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    let head = branch.head_cell_id.as_deref().unwrap_or("<none>");
    println!("Created branch {:?} at {head}", branch.name);
    if switch_now {
        println!("Switched to {:?}", branch.name);
    }
    Ok(())
}
