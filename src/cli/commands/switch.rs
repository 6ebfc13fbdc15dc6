//! `converge switch` - switch branches with a safety snapshot.

use std::path::Path;

use serde::Serialize;

use crate::error::Result;

use super::open_service;

#[derive(Serialize)]
struct SwitchOutput<'a> {
    branch: &'a str,
    head_cell: &'a str,
    safety_cell: Option<&'a str>,
}

pub fn execute(project_dir: &Path, name: &str, json: bool) -> Result<()> {
    let mut svc = open_service(project_dir)?;

    let (safety, target) = svc.switch_branch(name.trim())?;

    if json {
        let output = SwitchOutput {
            branch: name.trim(),
            head_cell: &target.id,
            safety_cell: safety.as_ref().map(|c| c.id.as_str()),
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    match safety {
        Some(safety) => {
            println!("Switched to {:?} at {}", name.trim(), target.id);
            println!("Safety snapshot saved as {} before switching", safety.id);
        }
        None => println!("Already on {:?} (head {})", name.trim(), target.id),
    }
    Ok(())
}
