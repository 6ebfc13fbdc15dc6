//! `converge eval` - on-demand evaluation of a cell.

use std::path::Path;

use serde::Serialize;

use crate::error::Result;

use super::open_service;

#[derive(Serialize)]
struct EvalOutput<'a> {
    cell: &'a str,
    tests_passed: Option<i64>,
    tests_failed: Option<i64>,
    lint_errors: Option<i64>,
    type_errors: Option<i64>,
    skipped: Vec<String>,
}

pub fn execute(project_dir: &Path, cell: &str, json: bool) -> Result<()> {
    let mut svc = open_service(project_dir)?;

    let result = svc.evaluate_cell(cell)?;

    if json {
        let output = EvalOutput {
            cell,
            tests_passed: result.tests_passed_opt(),
            tests_failed: result.tests_failed_opt(),
            lint_errors: result.lint_errors_opt(),
            type_errors: result.type_errors_opt(),
            skipped: result.skipped.clone(),
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("Eval updated for {cell}");
    if result.has_tests {
        println!("  Tests: {} passed, {} failed", result.tests_passed, result.tests_failed);
    }
    if result.has_lint {
        println!("  Lint errors: {}", result.lint_errors);
    }
    if result.has_types {
        println!("  Type errors: {}", result.type_errors);
    }
    if !result.skipped.is_empty() {
        println!("  Skipped: {}", result.skipped.join(", "));
    }
    Ok(())
}
