//! `converge init` - create the state directory and database.

use std::path::Path;

use serde::Serialize;

use crate::config;
use crate::engine::init_repository;
use crate::error::Result;

#[derive(Serialize)]
struct InitOutput {
    state_dir: String,
}

pub fn execute(project_dir: &Path, json: bool) -> Result<()> {
    init_repository(project_dir)?;

    let state_dir = config::state_dir(project_dir);
    if json {
        let output = InitOutput { state_dir: state_dir.display().to_string() };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Initialized converge in {}", state_dir.display());
    }
    Ok(())
}
