//! `converge snap` - manual capture.

use std::path::Path;

use crate::cli::SnapArgs;
use crate::engine::SnapOptions;
use crate::error::Result;

use super::open_service;

pub fn execute(project_dir: &Path, args: &SnapArgs, json: bool) -> Result<()> {
    let mut svc = open_service(project_dir)?;

    let cell = svc.create_cell(&SnapOptions {
        message: args.message.trim().to_string(),
        tags: args.tags.clone(),
        agent: args.agent.clone(),
        source: "manual".to_string(),
        run_eval: args.eval,
    })?;

    if json {
        println!("{}", serde_json::to_string(&cell)?);
        return Ok(());
    }

    println!("Created {}: {:?}", cell.id, cell.message);
    println!("  Branch: {}", cell.branch);
    println!(
        "  Files: {} (+{} ~{} -{})  Lines: +{}/-{}",
        cell.total_files,
        cell.files_added,
        cell.files_modified,
        cell.files_removed,
        cell.lines_added,
        cell.lines_removed
    );
    println!("  LOC total: {}  delta: {:+}", cell.total_loc, cell.loc_delta);
    if args.eval {
        if cell.eval_ran {
            println!("  Eval: completed");
        } else {
            println!("  Eval: requested (see converge eval for details)");
        }
    }
    Ok(())
}
