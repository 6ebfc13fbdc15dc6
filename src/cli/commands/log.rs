//! `converge log` - cell history.

use std::path::Path;

use colored::Colorize;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::storage::Cell;

use super::open_service;

#[derive(Serialize)]
struct LogOutput<'a> {
    active_branch: &'a str,
    head_cell: &'a str,
    cells: &'a [Cell],
}

pub fn execute(
    project_dir: &Path,
    limit: i64,
    branch: Option<&str>,
    all: bool,
    json: bool,
) -> Result<()> {
    if all && branch.is_some_and(|b| !b.trim().is_empty()) {
        return Err(Error::InvalidArgument(
            "cannot use --branch and --all together".to_string(),
        ));
    }

    let mut svc = open_service(project_dir)?;
    let active_branch = svc.active_branch()?;
    let head_cell_id = svc.db.get_meta("head_cell")?.unwrap_or_default();

    let target_branch = match branch.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => active_branch.clone(),
    };

    let cells = if all {
        svc.db.list_cells(limit)?
    } else {
        svc.db.list_cells_by_branch(&target_branch, limit)?
    };

    if json {
        let output = LogOutput {
            active_branch: &active_branch,
            head_cell: &head_cell_id,
            cells: &cells,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if cells.is_empty() {
        if all {
            println!("No cells yet. Run 'converge snap -m \"message\"' to create one.");
        } else {
            println!(
                "No cells on branch {target_branch:?} yet. Run 'converge snap -m \"message\"' to create one."
            );
        }
        return Ok(());
    }

    if all {
        println!(
            "Showing {} most recent cells across all branches (active: {active_branch})\n",
            cells.len()
        );
    } else {
        println!("Showing {} most recent cells on branch {target_branch}\n", cells.len());
    }
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            println!();
        }
        print_cell(cell, cell.id == head_cell_id);
    }
    Ok(())
}

fn print_cell(cell: &Cell, is_head: bool) {
    let head_label = if is_head {
        format!("  {}", "HEAD".green())
    } else {
        String::new()
    };
    let branch_label = if cell.branch.trim().is_empty() {
        String::new()
    } else {
        format!("  {}", format!("[{}]", cell.branch).cyan())
    };
    println!("[{}]{head_label}{branch_label}", cell.id.bold());
    println!("  {} : {}", "time".dimmed(), cell.timestamp);
    println!("  {} : {:?}", "message".dimmed(), cell.message);

    let mut metadata = format!("source={}", cell.source.cyan());
    if let Some(ref agent) = cell.agent {
        metadata.push_str(&format!(" | agent={}", agent.cyan()));
    }
    if let Some(ref tags) = cell.tags {
        metadata.push_str(&format!(" | tags={}", tags.cyan()));
    }
    println!("  {} : {metadata}", "metadata".dimmed());

    println!(
        "  {} : files {} {} {} | lines {} {}",
        "changes".dimmed(),
        format!("+{}", cell.files_added).green(),
        format!("~{}", cell.files_modified).yellow(),
        format!("-{}", cell.files_removed).red(),
        format!("+{}", cell.lines_added).green(),
        format!("-{}", cell.lines_removed).red(),
    );

    let loc_delta = format!("{:+}", cell.loc_delta);
    let loc_delta = match cell.loc_delta {
        d if d > 0 => loc_delta.red(),
        d if d < 0 => loc_delta.green(),
        _ => loc_delta.yellow(),
    };
    println!(
        "  complexity(LOC): total {} (delta {loc_delta}) across {} files",
        cell.total_loc, cell.total_files
    );

    print_eval_line(cell);
}

fn print_eval_line(cell: &Cell) {
    if cell.eval_requested && !cell.eval_ran {
        println!("  {} : {}", "eval".dimmed(), "pending".yellow());
        return;
    }
    if !cell.eval_ran {
        println!("  {} : not requested", "eval".dimmed());
        return;
    }

    let mut parts: Vec<String> = Vec::with_capacity(4);
    if cell.tests_passed.is_some() || cell.tests_failed.is_some() {
        let passed = cell.tests_passed.unwrap_or(0);
        let failed = cell.tests_failed.unwrap_or(0);
        let label = format!("tests {}/{}", passed, passed + failed);
        parts.push(if failed > 0 { label.red() } else { label.green() }.to_string());
    }
    if let Some(lint) = cell.lint_errors {
        let label = format!("lint {lint}");
        parts.push(if lint > 0 { label.red() } else { label.green() }.to_string());
    }
    if let Some(types) = cell.type_errors {
        let label = format!("types {types}");
        parts.push(if types > 0 { label.red() } else { label.green() }.to_string());
    }
    if let Some(ref skipped) = cell.eval_skipped {
        parts.push(format!("skipped {skipped}").yellow().to_string());
    }
    if let Some(ref error) = cell.eval_error {
        parts.push(format!("error {error}").red().to_string());
    }

    if parts.is_empty() {
        println!("  {} : {}", "eval".dimmed(), "complete".green());
    } else {
        println!("  {} : {}", "eval".dimmed(), parts.join(" | "));
    }
}
