//! External evaluation runners.
//!
//! The pipeline talks to an injected [`Evaluator`]; [`ToolRunner`] is the
//! reference implementation that detects project types and shells out to
//! the matching test/lint/type tools. Counts carry a presence flag so a
//! category that never ran stays `NULL` in the cell's eval slot.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::debug;

use crate::error::Result;

/// Kinds of projects the reference runner knows how to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectType {
    Go,
    Python,
    Node,
}

/// Evaluation outcome: per-category counts tagged by presence, plus the
/// tools that were skipped because they were not installed.
#[derive(Debug, Default, Clone)]
pub struct EvalResult {
    pub tests_passed: i64,
    pub tests_failed: i64,
    pub lint_errors: i64,
    pub type_errors: i64,

    pub has_tests: bool,
    pub has_lint: bool,
    pub has_types: bool,

    pub skipped: Vec<String>,
}

impl EvalResult {
    #[must_use]
    pub fn tests_passed_opt(&self) -> Option<i64> {
        self.has_tests.then_some(self.tests_passed)
    }

    #[must_use]
    pub fn tests_failed_opt(&self) -> Option<i64> {
        self.has_tests.then_some(self.tests_failed)
    }

    #[must_use]
    pub fn lint_errors_opt(&self) -> Option<i64> {
        self.has_lint.then_some(self.lint_errors)
    }

    #[must_use]
    pub fn type_errors_opt(&self) -> Option<i64> {
        self.has_types.then_some(self.type_errors)
    }

    /// Skipped tools as a CSV string, `None` when nothing was skipped.
    #[must_use]
    pub fn skipped_opt(&self) -> Option<String> {
        if self.skipped.is_empty() {
            None
        } else {
            Some(self.skipped.join(","))
        }
    }
}

/// Injected evaluation collaborator.
pub trait Evaluator {
    /// Evaluate the project directory.
    ///
    /// # Errors
    ///
    /// Returns an error when the evaluation itself cannot run; per-tool
    /// absence is reported through the result's skipped list instead.
    fn run(&self, project_dir: &Path) -> Result<EvalResult>;
}

/// Reference evaluator shelling out to language toolchains.
#[derive(Debug, Clone)]
pub struct ToolRunner {
    /// Per-command deadline; commands still running when it expires are
    /// killed and counted as one failure/problem.
    timeout: Option<Duration>,
}

impl Default for ToolRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRunner {
    #[must_use]
    pub fn new() -> Self {
        Self { timeout: None }
    }

    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout: Some(timeout) }
    }
}

impl Evaluator for ToolRunner {
    fn run(&self, project_dir: &Path) -> Result<EvalResult> {
        let mut res = EvalResult::default();
        let projects = detect_projects(project_dir);
        if projects.is_empty() {
            res.skipped.push("no-project-detected".to_string());
            return Ok(res);
        }

        for project in projects {
            match project {
                ProjectType::Go => self.run_go_checks(project_dir, &mut res),
                ProjectType::Python => self.run_python_checks(project_dir, &mut res),
                ProjectType::Node => self.run_node_checks(project_dir, &mut res),
            }
        }

        Ok(res)
    }
}

impl ToolRunner {
    fn run_go_checks(&self, dir: &Path, res: &mut EvalResult) {
        if tool_exists("go") {
            let (out, failed_cmd) = self.run_cmd(dir, "go", &["test", "-json", "./..."]);
            let (passed, mut failed) = parse_go_test_output(&out);
            if failed_cmd && failed == 0 {
                failed = 1;
            }
            res.has_tests = true;
            res.tests_passed += passed;
            res.tests_failed += failed;
        } else {
            res.skipped.push("go".to_string());
        }

        if tool_exists("golangci-lint") {
            let (out, failed_cmd) = self.run_cmd(dir, "golangci-lint", &["run", "./..."]);
            res.has_lint = true;
            res.lint_errors += conservative_problem_count(&out, failed_cmd);
        } else {
            res.skipped.push("golangci-lint".to_string());
        }
    }

    fn run_python_checks(&self, dir: &Path, res: &mut EvalResult) {
        if tool_exists("pytest") {
            let (out, failed_cmd) = self.run_cmd(dir, "pytest", &["-q", "--tb=no"]);
            let (passed, mut failed) = parse_pytest_summary(&out);
            if failed_cmd && failed == 0 {
                failed = 1;
            }
            res.has_tests = true;
            res.tests_passed += passed;
            res.tests_failed += failed;
        } else {
            res.skipped.push("pytest".to_string());
        }

        if tool_exists("ruff") {
            let (out, failed_cmd) = self.run_cmd(dir, "ruff", &["check", "."]);
            res.has_lint = true;
            res.lint_errors += conservative_problem_count(&out, failed_cmd);
        } else {
            res.skipped.push("ruff".to_string());
        }

        if tool_exists("mypy") {
            let (out, failed_cmd) = self.run_cmd(dir, "mypy", &["."]);
            res.has_types = true;
            res.type_errors += conservative_problem_count(&out, failed_cmd);
        } else {
            res.skipped.push("mypy".to_string());
        }
    }

    fn run_node_checks(&self, dir: &Path, res: &mut EvalResult) {
        if tool_exists("npm") {
            let (_, failed_cmd) = self.run_cmd(dir, "npm", &["test", "--silent"]);
            res.has_tests = true;
            if failed_cmd {
                res.tests_failed += 1;
            } else {
                res.tests_passed += 1;
            }
        } else {
            res.skipped.push("npm".to_string());
        }

        if tool_exists("npx") {
            let (out_lint, lint_failed) = self.run_cmd(dir, "npx", &["eslint", "."]);
            res.has_lint = true;
            res.lint_errors += conservative_problem_count(&out_lint, lint_failed);

            let (out_types, types_failed) = self.run_cmd(dir, "npx", &["tsc", "--noEmit"]);
            res.has_types = true;
            res.type_errors += conservative_problem_count(&out_types, types_failed);
        } else {
            res.skipped.push("npx".to_string());
        }
    }

    /// Run a tool, returning its combined output and whether it failed
    /// (non-zero exit, spawn failure, or deadline expiry).
    fn run_cmd(&self, dir: &Path, name: &str, args: &[&str]) -> (String, bool) {
        let Some(tool) = resolve_tool(name) else {
            return (String::new(), true);
        };

        debug!(tool = name, ?args, "running evaluation command");
        let spawned = Command::new(tool)
            .args(args)
            .current_dir(dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => return (e.to_string(), true),
        };

        if let Some(timeout) = self.timeout {
            let deadline = Instant::now() + timeout;
            loop {
                match child.try_wait() {
                    Ok(Some(_)) => break,
                    Ok(None) if Instant::now() >= deadline => {
                        let _ = child.kill();
                        break;
                    }
                    Ok(None) => std::thread::sleep(Duration::from_millis(50)),
                    Err(_) => break,
                }
            }
        }

        match child.wait_with_output() {
            Ok(output) => {
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                (text, !output.status.success())
            }
            Err(e) => (e.to_string(), true),
        }
    }
}

/// Detect project types by marker files in the directory root.
#[must_use]
pub fn detect_projects(dir: &Path) -> Vec<ProjectType> {
    let mut out = Vec::with_capacity(3);
    if dir.join("go.mod").exists() {
        out.push(ProjectType::Go);
    }
    if dir.join("pyproject.toml").exists()
        || dir.join("setup.py").exists()
        || dir.join("pytest.ini").exists()
    {
        out.push(ProjectType::Python);
    }
    if dir.join("package.json").exists() {
        out.push(ProjectType::Node);
    }
    out
}

fn tool_exists(name: &str) -> bool {
    resolve_tool(name).is_some()
}

fn resolve_tool(name: &str) -> Option<PathBuf> {
    if let Some(paths) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&paths) {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    // Common install locations missed by stripped-down PATHs.
    if name == "go" {
        for candidate in ["/usr/local/go/bin/go", "/opt/homebrew/bin/go"] {
            let path = Path::new(candidate);
            if path.exists() {
                return Some(path.to_path_buf());
            }
        }
    }
    None
}

fn count_problem_lines(output: &str) -> i64 {
    let output = output.trim();
    if output.is_empty() {
        return 0;
    }
    output
        .split('\n')
        .filter(|line| !line.trim().is_empty())
        .count() as i64
}

fn conservative_problem_count(output: &str, cmd_failed: bool) -> i64 {
    let count = count_problem_lines(output);
    if cmd_failed && count == 0 {
        return 1;
    }
    count
}

fn parse_go_test_output(output: &str) -> (i64, i64) {
    let mut passed = 0;
    let mut failed = 0;
    for line in output.split('\n') {
        if line.contains(r#""Action":"pass""#) && line.contains(r#""Test":""#) {
            passed += 1;
        }
        if line.contains(r#""Action":"fail""#) && line.contains(r#""Test":""#) {
            failed += 1;
        }
    }
    (passed, failed)
}

fn parse_pytest_summary(output: &str) -> (i64, i64) {
    let passed_re = Regex::new(r"([0-9]+)\s+passed").expect("static regex");
    let failed_re = Regex::new(r"([0-9]+)\s+failed").expect("static regex");
    let passed = passed_re
        .captures(output)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0);
    let failed = failed_re
        .captures(output)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0);
    (passed, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_detect_projects() {
        let dir = tempdir().unwrap();
        assert!(detect_projects(dir.path()).is_empty());

        std::fs::write(dir.path().join("go.mod"), "module x\n").unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        let detected = detect_projects(dir.path());
        assert_eq!(detected, vec![ProjectType::Go, ProjectType::Node]);

        std::fs::write(dir.path().join("pyproject.toml"), "").unwrap();
        let detected = detect_projects(dir.path());
        assert_eq!(
            detected,
            vec![ProjectType::Go, ProjectType::Python, ProjectType::Node]
        );
    }

    #[test]
    fn test_run_with_no_project_skips() {
        let dir = tempdir().unwrap();
        let res = ToolRunner::new().run(dir.path()).unwrap();
        assert_eq!(res.skipped, vec!["no-project-detected"]);
        assert!(!res.has_tests && !res.has_lint && !res.has_types);
        assert!(res.tests_passed_opt().is_none());
        assert!(res.skipped_opt().is_some());
    }

    #[test]
    fn test_parse_go_test_output() {
        let out = concat!(
            r#"{"Action":"run","Test":"TestA"}"#, "\n",
            r#"{"Action":"pass","Test":"TestA"}"#, "\n",
            r#"{"Action":"fail","Test":"TestB"}"#, "\n",
            r#"{"Action":"pass","Package":"x"}"#, "\n",
        );
        assert_eq!(parse_go_test_output(out), (1, 1));
    }

    #[test]
    fn test_parse_pytest_summary() {
        assert_eq!(parse_pytest_summary("3 passed, 2 failed in 0.12s"), (3, 2));
        assert_eq!(parse_pytest_summary("5 passed in 0.05s"), (5, 0));
        assert_eq!(parse_pytest_summary("no tests ran"), (0, 0));
    }

    #[test]
    fn test_conservative_problem_count() {
        assert_eq!(conservative_problem_count("", false), 0);
        assert_eq!(conservative_problem_count("", true), 1);
        assert_eq!(conservative_problem_count("a\n\nb\n", true), 2);
    }

    #[test]
    fn test_result_presence_flags() {
        let mut res = EvalResult::default();
        assert!(res.tests_passed_opt().is_none());
        res.has_tests = true;
        res.tests_passed = 4;
        assert_eq!(res.tests_passed_opt(), Some(4));
        assert_eq!(res.tests_failed_opt(), Some(0));
    }
}
