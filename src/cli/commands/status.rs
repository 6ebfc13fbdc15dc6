//! `converge status` - working tree vs. latest cell.

use std::path::Path;

use serde::Serialize;

use crate::engine::WorkingTreeDelta;
use crate::error::Result;
use crate::storage::Cell;

use super::open_service;

#[derive(Serialize)]
struct StatusOutput<'a> {
    active_branch: &'a str,
    head_cell: Option<&'a str>,
    latest: Option<&'a Cell>,
    delta: WorkingTreeDelta,
}

pub fn execute(project_dir: &Path, json: bool) -> Result<()> {
    let mut svc = open_service(project_dir)?;

    let active_branch = svc.active_branch()?;
    let branch_record = svc.db.get_branch(&active_branch)?;
    let head_cell_id = branch_record.and_then(|b| b.head_cell_id).unwrap_or_default();

    let (latest, delta) = svc.working_tree_delta()?;

    if json {
        let output = StatusOutput {
            active_branch: &active_branch,
            head_cell: if head_cell_id.is_empty() { None } else { Some(&head_cell_id) },
            latest: latest.as_ref(),
            delta,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    let Some(latest) = latest else {
        println!("Active branch: {active_branch}");
        println!("No cells yet. Run 'converge snap -m \"message\"' to create one.");
        return Ok(());
    };

    if head_cell_id.is_empty() {
        println!("Active branch: {active_branch}");
    } else {
        println!("Active branch: {active_branch} (head {head_cell_id})");
    }
    println!("Last cell: [{}] {} {:?}", latest.id, latest.timestamp, latest.message);
    println!("  branch: {}", latest.branch);
    println!("  complexity(LOC): {} (delta {:+})", latest.total_loc, latest.loc_delta);
    if delta.is_clean() {
        println!("  Working tree is clean (matches last cell)");
    } else {
        println!(
            "  Changes since last cell: {} modified, {} new, {} deleted",
            delta.modified, delta.added, delta.removed
        );
    }
    Ok(())
}
