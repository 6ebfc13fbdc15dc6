//! Semantic-comparison data layer.
//!
//! Builds the prompt an external chat model uses to compare two cells and
//! parses its structured reply. The transport is an injected [`ChatModel`];
//! this crate never performs the network call itself.

use std::collections::HashMap;

use serde::Serialize;

use crate::diff;
use crate::error::{Error, Result};
use crate::snapshot::is_text;
use crate::storage::{Cell, Database};
use crate::store::BlobStore;

/// Default cap on non-empty diff lines included in a prompt.
const DEFAULT_MAX_DIFF_LINES: usize = 800;

/// Diff context used on the first rendering attempt.
const DEFAULT_DIFF_CONTEXT: i64 = 120;

/// Diff context used when the first attempt exceeds the budget.
const FALLBACK_DIFF_CONTEXT: i64 = 30;

/// System prompt fixing the diff direction and the reply format.
pub const COMPARE_SYSTEM_PROMPT: &str = "You are a precise code-change reviewer. \
Compare Cell A to Cell B only. In unified diffs, '-' lines belong to Cell A and \
'+' lines belong to Cell B. Do not reverse this direction and do not infer edits \
that are not shown. Return EXACT format: SUMMARY: <2-3 sentences>\n\
WINNER: <cell_id or tie> - <one sentence why>\nHIGHLIGHTS:\n- <bullet>\n- <bullet>\n- <bullet>";

/// Options for one comparison.
#[derive(Debug, Default, Clone)]
pub struct CompareOptions {
    /// Cap on non-empty diff lines; `0` uses the default (800).
    pub max_diff_lines: usize,
}

/// Parsed comparison verdict.
#[derive(Debug, Default, Clone, Serialize)]
pub struct CompareResult {
    pub summary: String,
    pub winner: String,
    pub highlights: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// External chat transport. Implementations send the system and user
/// prompts to a model and return its text reply.
pub trait ChatModel {
    /// # Errors
    ///
    /// Returns an error if the model call fails.
    fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

/// Builds comparison prompts from stored cells and blobs.
pub struct Comparer<'a> {
    db: &'a Database,
    store: &'a BlobStore,
}

impl<'a> Comparer<'a> {
    #[must_use]
    pub fn new(db: &'a Database, store: &'a BlobStore) -> Self {
        Self { db, store }
    }

    /// Compare two cells through the given chat model.
    ///
    /// # Errors
    ///
    /// Returns an error if either cell is missing, the prompt cannot be
    /// built, or the model call fails.
    pub fn compare(
        &self,
        model: &dyn ChatModel,
        cell_a_id: &str,
        cell_b_id: &str,
        opts: &CompareOptions,
    ) -> Result<CompareResult> {
        let prompt = self.build_prompt(cell_a_id, cell_b_id, opts)?;
        let reply = model.complete(COMPARE_SYSTEM_PROMPT, &prompt)?;
        Ok(parse_compare_response(&reply))
    }

    /// Render the user prompt for comparing `cell_a` to `cell_b`.
    ///
    /// Modified files are rendered with [`diff::expanded_unified_diff`] at
    /// context 120, re-rendered at context 30 when the non-empty-line
    /// budget is exceeded, and omitted entirely when still over. Binary
    /// files are skipped. Remaining budget is spent on new-file contents.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CellNotFound`] when either cell is missing.
    pub fn build_prompt(
        &self,
        cell_a_id: &str,
        cell_b_id: &str,
        opts: &CompareOptions,
    ) -> Result<String> {
        let cell_a = self.load_cell(cell_a_id)?;
        let cell_b = self.load_cell(cell_b_id)?;

        let map_a = self.manifest_map(&cell_a.id)?;
        let map_b = self.manifest_map(&cell_b.id)?;
        let result = diff::compare_manifests(&map_a, &map_b);

        let max_diff_lines = if opts.max_diff_lines == 0 {
            DEFAULT_MAX_DIFF_LINES
        } else {
            opts.max_diff_lines
        };

        let mut prompt = String::new();
        prompt.push_str(&format!(
            "Cell A: {} (branch={}, msg={:?}, loc={}, files={})\n",
            cell_a.id, cell_a.branch, cell_a.message, cell_a.total_loc, cell_a.total_files
        ));
        prompt.push_str(&format!(
            "Cell B: {} (branch={}, msg={:?}, loc={}, files={})\n",
            cell_b.id, cell_b.branch, cell_b.message, cell_b.total_loc, cell_b.total_files
        ));
        prompt.push_str(
            "Diff direction: A -> B. In each patch, '-' lines are from Cell A and '+' lines are from Cell B.\n",
        );
        prompt.push_str(&format!(
            "High-level counts: +{} added, ~{} modified, -{} removed\n\n",
            result.added.len(),
            result.modified.len(),
            result.removed.len()
        ));

        if !result.added.is_empty() {
            prompt.push_str(&format!("Added files: {}\n", result.added.join(", ")));
        }
        if !result.removed.is_empty() {
            prompt.push_str(&format!("Removed files: {}\n", result.removed.join(", ")));
        }
        if !result.added.is_empty() || !result.removed.is_empty() {
            prompt.push('\n');
        }

        let mut remaining = max_diff_lines;
        for path in &result.modified {
            if remaining == 0 {
                break;
            }
            let (Ok(old_data), Ok(new_data)) =
                (self.store.read(&map_a[path]), self.store.read(&map_b[path]))
            else {
                continue;
            };
            if !is_text(&old_data) || !is_text(&new_data) {
                prompt.push_str(&format!("### {path} (binary diff skipped)\n\n"));
                continue;
            }

            let old_text = String::from_utf8_lossy(&old_data);
            let new_text = String::from_utf8_lossy(&new_data);

            let mut patch =
                diff::expanded_unified_diff(path, &old_text, &new_text, DEFAULT_DIFF_CONTEXT);
            let mut lines = count_non_empty_lines(&patch);
            if lines > remaining {
                patch =
                    diff::expanded_unified_diff(path, &old_text, &new_text, FALLBACK_DIFF_CONTEXT);
                lines = count_non_empty_lines(&patch);
            }
            if lines > remaining {
                prompt.push_str(&format!("### {path} (diff omitted due to max-diff-lines limit)\n\n"));
                continue;
            }
            prompt.push_str(&format!("### {path}\n{patch}\n"));
            remaining -= lines;
        }

        if remaining > 0 {
            for path in &result.added {
                if remaining == 0 {
                    break;
                }
                let Ok(data) = self.store.read(&map_b[path]) else {
                    continue;
                };
                if !is_text(&data) {
                    continue;
                }
                let content = String::from_utf8_lossy(&data);
                let content_lines = count_non_empty_lines(&content);
                if content_lines > remaining {
                    continue;
                }
                prompt.push_str(&format!("### {path} (new file)\n{content}\n"));
                remaining -= content_lines;
            }
        }

        Ok(prompt)
    }

    fn load_cell(&self, id: &str) -> Result<Cell> {
        self.db
            .get_cell(id)?
            .ok_or_else(|| Error::CellNotFound { id: id.to_string() })
    }

    fn manifest_map(&self, cell_id: &str) -> Result<HashMap<String, String>> {
        let entries = self.db.get_manifest(cell_id)?;
        Ok(entries.into_iter().map(|e| (e.path, e.hash)).collect())
    }
}

fn count_non_empty_lines(text: &str) -> usize {
    text.split('\n').filter(|line| !line.trim().is_empty()).count()
}

/// Parse a model reply in the `SUMMARY: / WINNER: / HIGHLIGHTS:` format.
/// Falls back to the whole reply as the summary when the format is absent.
#[must_use]
pub fn parse_compare_response(content: &str) -> CompareResult {
    let mut result = CompareResult::default();
    let mut section = "";

    for raw in content.split('\n') {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix("SUMMARY:") {
            result.summary = rest.trim().to_string();
            section = "summary";
        } else if let Some(rest) = line.strip_prefix("WINNER:") {
            result.winner = rest.trim().to_string();
            section = "winner";
        } else if line.starts_with("HIGHLIGHTS:") {
            section = "highlights";
        } else if section == "summary" {
            if result.summary.is_empty() {
                result.summary = line.to_string();
            } else {
                result.summary.push(' ');
                result.summary.push_str(line);
            }
        } else if section == "highlights" {
            if let Some(rest) = line.strip_prefix('-') {
                let highlight = rest.trim();
                if !highlight.is_empty() {
                    result.highlights.push(highlight.to_string());
                }
            }
        }
    }

    if result.summary.is_empty() {
        result.summary = content.trim().to_string();
    }
    result
}
