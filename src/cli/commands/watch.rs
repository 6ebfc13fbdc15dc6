//! `converge watch` - auto-capture on file changes.

use std::path::Path;
use std::time::Duration;

use crate::engine::SnapOptions;
use crate::error::Result;
use crate::watch::{stop_flag, watch};

use super::open_service;

pub fn execute(project_dir: &Path, debounce_ms: u64) -> Result<()> {
    let mut svc = open_service(project_dir)?;
    svc.active_branch()?;
    let debounce = Duration::from_millis(debounce_ms);
    let stop = stop_flag();

    println!(
        "Watching {} (debounce {}ms). Press Ctrl+C to stop.",
        project_dir.display(),
        debounce_ms
    );

    watch(project_dir, debounce, &stop, move || {
        if svc.is_restore_in_progress() {
            return Ok(());
        }
        let (cell, created) = svc.create_cell_if_changed(&SnapOptions {
            message: "auto-captured by watch".to_string(),
            source: "watch".to_string(),
            run_eval: false,
            ..SnapOptions::default()
        })?;
        if created {
            if let Some(cell) = cell {
                println!(
                    "[watch] {} branch={} files={} loc={} delta={:+}",
                    cell.id, cell.branch, cell.total_files, cell.total_loc, cell.loc_delta
                );
            }
        }
        Ok(())
    })
}
