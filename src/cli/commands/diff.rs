//! `converge diff` - differences between two cells.

use std::collections::HashMap;
use std::path::Path;

use colored::Colorize;
use serde::Serialize;

use crate::diff::{compare_manifests, unified_diff, DiffResult};
use crate::error::{Error, Result};
use crate::snapshot::is_text;

use super::open_service;

#[derive(Serialize)]
struct DiffOutput<'a> {
    from: &'a str,
    to: &'a str,
    added: &'a [String],
    modified: &'a [String],
    removed: &'a [String],
}

pub fn execute(project_dir: &Path, cell_a: &str, cell_b: &str, json: bool) -> Result<()> {
    let svc = open_service(project_dir)?;

    for id in [cell_a, cell_b] {
        if svc.db.get_cell(id)?.is_none() {
            return Err(Error::CellNotFound { id: id.to_string() });
        }
    }

    let map_a = manifest_map(&svc, cell_a)?;
    let map_b = manifest_map(&svc, cell_b)?;
    let result = compare_manifests(&map_a, &map_b);

    if json {
        let output = DiffOutput {
            from: cell_a,
            to: cell_b,
            added: &result.added,
            modified: &result.modified,
            removed: &result.removed,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    print_summary(cell_a, cell_b, &result);
    print_sections(&result);
    print_patches(&svc, &result, &map_a, &map_b);

    if result.is_empty() {
        println!("{}", "No differences.".green());
    }
    Ok(())
}

fn manifest_map(
    svc: &crate::engine::Service,
    cell_id: &str,
) -> Result<HashMap<String, String>> {
    let entries = svc.db.get_manifest(cell_id)?;
    Ok(entries.into_iter().map(|e| (e.path, e.hash)).collect())
}

fn print_summary(cell_a: &str, cell_b: &str, result: &DiffResult) {
    let total = result.added.len() + result.modified.len() + result.removed.len();
    println!("{} {} {} {}", "Diff".bold(), cell_a.bold(), "->".dimmed(), cell_b.bold());
    println!(
        "{} {} {} {} {} {total} total changed\n",
        "Summary:".dimmed(),
        format!("+{} added", result.added.len()).green(),
        format!("~{} modified", result.modified.len()).yellow(),
        format!("-{} removed", result.removed.len()).red(),
        "|".dimmed(),
    );
}

fn print_sections(result: &DiffResult) {
    if !result.added.is_empty() {
        println!("{} ({}):", "Added".green(), result.added.len());
        for path in &result.added {
            println!("  {} {path}", "+".green());
        }
        println!();
    }
    if !result.removed.is_empty() {
        println!("{} ({}):", "Removed".red(), result.removed.len());
        for path in &result.removed {
            println!("  {} {path}", "-".red());
        }
        println!();
    }
    if !result.modified.is_empty() {
        println!("{} ({}):", "Modified".yellow(), result.modified.len());
        for path in &result.modified {
            println!("  {} {path}", "~".yellow());
        }
        println!();
    }
}

fn print_patches(
    svc: &crate::engine::Service,
    result: &DiffResult,
    map_a: &HashMap<String, String>,
    map_b: &HashMap<String, String>,
) {
    for path in &result.modified {
        let (Ok(old_data), Ok(new_data)) =
            (svc.store.read(&map_a[path]), svc.store.read(&map_b[path]))
        else {
            continue;
        };
        if !is_text(&old_data) || !is_text(&new_data) {
            println!("{} {path}", "binary diff skipped for".dimmed());
            continue;
        }
        let unified = unified_diff(
            path,
            &String::from_utf8_lossy(&old_data),
            &String::from_utf8_lossy(&new_data),
        );
        if !unified.is_empty() {
            println!("{} {}", "Patch:".cyan(), path.bold());
            println!("{}\n", colorize_unified(&unified));
        }
    }
}

fn colorize_unified(unified: &str) -> String {
    unified
        .split('\n')
        .map(|line| {
            if line.starts_with("+++") || line.starts_with("---") {
                line.cyan().to_string()
            } else if line.starts_with("@@") {
                line.yellow().to_string()
            } else if line.starts_with('+') {
                line.green().to_string()
            } else if line.starts_with('-') {
                line.red().to_string()
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
