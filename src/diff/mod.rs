//! Manifest and line-oriented diffing.
//!
//! Two levels: a set diff over `(path -> hash)` manifests, and unified
//! diffs over file text. `unified_diff` emits one hunk spanning the whole
//! file; `expanded_unified_diff` groups changes into hunks with a bounded
//! resynchronization search and configurable context.

use std::collections::HashMap;
use std::fmt::Write as _;

/// Window size for the expanded diff's resynchronization search.
const RESYNC_WINDOW: usize = 50;

/// Classified manifest difference, each list sorted by path.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DiffResult {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
}

impl DiffResult {
    /// True when nothing changed between the manifests.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

/// Classify paths by presence and hash inequality between two manifests.
#[must_use]
pub fn compare_manifests(
    from: &HashMap<String, String>,
    to: &HashMap<String, String>,
) -> DiffResult {
    let mut result = DiffResult::default();
    for (path, to_hash) in to {
        match from.get(path) {
            None => result.added.push(path.clone()),
            Some(from_hash) if from_hash != to_hash => result.modified.push(path.clone()),
            Some(_) => {}
        }
    }
    for path in from.keys() {
        if !to.contains_key(path) {
            result.removed.push(path.clone());
        }
    }
    result.added.sort();
    result.modified.sort();
    result.removed.sort();
    result
}

/// Compact full-file unified diff: two headers, one hunk spanning all
/// lines. Returns an empty string when the contents are byte-equal.
#[must_use]
pub fn unified_diff(filename: &str, old_content: &str, new_content: &str) -> String {
    if old_content == new_content {
        return String::new();
    }
    let old_lines: Vec<&str> = old_content.split('\n').collect();
    let new_lines: Vec<&str> = new_content.split('\n').collect();

    let mut out = String::new();
    let _ = writeln!(out, "--- a/{filename}");
    let _ = writeln!(out, "+++ b/{filename}");
    let _ = writeln!(out, "@@ -1,{} +1,{} @@", old_lines.len(), new_lines.len());

    let max_lines = old_lines.len().max(new_lines.len());
    for i in 0..max_lines {
        match (old_lines.get(i), new_lines.get(i)) {
            (Some(old), Some(new)) if old == new => {
                let _ = writeln!(out, " {old}");
            }
            (Some(old), Some(new)) => {
                let _ = writeln!(out, "-{old}");
                let _ = writeln!(out, "+{new}");
            }
            (Some(old), None) => {
                let _ = writeln!(out, "-{old}");
            }
            (None, Some(new)) => {
                let _ = writeln!(out, "+{new}");
            }
            (None, None) => {}
        }
    }
    out
}

/// Unified diff with `context_lines` of surrounding unchanged lines per
/// hunk. Changes are found by walking both sides in lockstep and, on
/// divergence, searching a bounded window for the nearest
/// resynchronization point (smallest old-side offset first). When no sync
/// point exists inside the window, one trailing hunk consumes the rest of
/// both sides. Negative context is treated as zero.
#[must_use]
pub fn expanded_unified_diff(
    filename: &str,
    old_content: &str,
    new_content: &str,
    context_lines: i64,
) -> String {
    if old_content == new_content {
        return String::new();
    }
    let context = usize::try_from(context_lines.max(0)).unwrap_or(0);

    let old_lines: Vec<&str> = old_content.split('\n').collect();
    let new_lines: Vec<&str> = new_content.split('\n').collect();
    let changes = compute_changes(&old_lines, &new_lines);
    if changes.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    let _ = writeln!(out, "--- a/{filename}");
    let _ = writeln!(out, "+++ b/{filename}");
    for hunk in group_hunks(&changes, &old_lines, &new_lines, context) {
        out.push_str(&hunk);
    }
    out
}

/// A changed region: `[old_start, old_end)` replaced by `[new_start, new_end)`.
#[derive(Debug, Clone, Copy)]
struct Change {
    old_start: usize,
    old_end: usize,
    new_start: usize,
    new_end: usize,
}

fn compute_changes(old_lines: &[&str], new_lines: &[&str]) -> Vec<Change> {
    let mut changes = Vec::new();
    let (mut i, mut j) = (0usize, 0usize);

    while i < old_lines.len() && j < new_lines.len() {
        if old_lines[i] == new_lines[j] {
            i += 1;
            j += 1;
            continue;
        }

        let (oi, oj) = (i, j);
        let mut found = false;
        'search: for di in 0..RESYNC_WINDOW {
            if oi + di >= old_lines.len() {
                break;
            }
            for dj in 0..RESYNC_WINDOW {
                if oj + dj >= new_lines.len() {
                    break;
                }
                if old_lines[oi + di] == new_lines[oj + dj] {
                    changes.push(Change {
                        old_start: oi,
                        old_end: oi + di,
                        new_start: oj,
                        new_end: oj + dj,
                    });
                    i = oi + di;
                    j = oj + dj;
                    found = true;
                    break 'search;
                }
            }
        }
        if !found {
            changes.push(Change {
                old_start: oi,
                old_end: old_lines.len(),
                new_start: oj,
                new_end: new_lines.len(),
            });
            return changes;
        }
    }

    if i < old_lines.len() || j < new_lines.len() {
        changes.push(Change {
            old_start: i,
            old_end: old_lines.len(),
            new_start: j,
            new_end: new_lines.len(),
        });
    }
    changes
}

fn group_hunks(
    changes: &[Change],
    old_lines: &[&str],
    new_lines: &[&str],
    context: usize,
) -> Vec<String> {
    let mut hunks = Vec::with_capacity(changes.len());
    for c in changes {
        let old_from = c.old_start.saturating_sub(context);
        let old_to = (c.old_end + context).min(old_lines.len());
        let new_from = c.new_start.saturating_sub(context);
        let new_to = (c.new_end + context).min(new_lines.len());

        let mut hunk = String::new();
        let _ = writeln!(
            hunk,
            "@@ -{},{} +{},{} @@",
            old_from + 1,
            old_to - old_from,
            new_from + 1,
            new_to - new_from
        );

        for line in &old_lines[old_from..c.old_start] {
            let _ = writeln!(hunk, " {line}");
        }
        for line in &old_lines[c.old_start..c.old_end] {
            let _ = writeln!(hunk, "-{line}");
        }
        for line in &new_lines[c.new_start..c.new_end] {
            let _ = writeln!(hunk, "+{line}");
        }
        for line in &old_lines[c.old_end..old_to] {
            let _ = writeln!(hunk, " {line}");
        }

        hunks.push(hunk);
    }
    hunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(p, h)| ((*p).to_string(), (*h).to_string()))
            .collect()
    }

    #[test]
    fn test_compare_manifests_classification() {
        let from = manifest(&[("kept.go", "h1"), ("changed.go", "h2"), ("gone.go", "h3")]);
        let to = manifest(&[("kept.go", "h1"), ("changed.go", "h2x"), ("new.go", "h4")]);

        let result = compare_manifests(&from, &to);
        assert_eq!(result.added, vec!["new.go"]);
        assert_eq!(result.modified, vec!["changed.go"]);
        assert_eq!(result.removed, vec!["gone.go"]);
    }

    #[test]
    fn test_compare_manifests_identity_is_empty() {
        let m = manifest(&[("a", "1"), ("b", "2")]);
        assert!(compare_manifests(&m, &m).is_empty());
    }

    #[test]
    fn test_compare_manifests_output_sorted() {
        let from = manifest(&[]);
        let to = manifest(&[("z.go", "1"), ("a.go", "2"), ("m.go", "3")]);
        let result = compare_manifests(&from, &to);
        assert_eq!(result.added, vec!["a.go", "m.go", "z.go"]);
    }

    #[test]
    fn test_unified_diff_equal_is_empty() {
        assert_eq!(unified_diff("f.txt", "same\n", "same\n"), "");
    }

    #[test]
    fn test_unified_diff_single_hunk() {
        let out = unified_diff("f.txt", "a\nb\n", "a\nc\n");
        let expected = "--- a/f.txt\n+++ b/f.txt\n@@ -1,3 +1,3 @@\n a\n-b\n+c\n \n";
        assert_eq!(out, expected);
    }

    #[test]
    fn test_unified_diff_addition() {
        let out = unified_diff("f.txt", "a", "a\nb");
        assert_eq!(out, "--- a/f.txt\n+++ b/f.txt\n@@ -1,1 +1,2 @@\n a\n+b\n");
    }

    #[test]
    fn test_expanded_diff_equal_is_empty() {
        assert_eq!(expanded_unified_diff("f.txt", "x\ny\n", "x\ny\n", 3), "");
    }

    #[test]
    fn test_expanded_diff_single_change_with_context() {
        let old = "1\n2\n3\n4\n5";
        let new = "1\n2\nX\n4\n5";
        let out = expanded_unified_diff("f.txt", old, new, 1);
        let expected =
            "--- a/f.txt\n+++ b/f.txt\n@@ -2,3 +2,3 @@\n 2\n-3\n+X\n 4\n";
        assert_eq!(out, expected);
    }

    #[test]
    fn test_expanded_diff_context_clamped_to_bounds() {
        let out = expanded_unified_diff("f.txt", "a\nb", "X\nb", 10);
        // Context of 10 clamps to the 2-line file.
        let expected = "--- a/f.txt\n+++ b/f.txt\n@@ -1,2 +1,2 @@\n-a\n+X\n b\n";
        assert_eq!(out, expected);
    }

    #[test]
    fn test_expanded_diff_negative_context_treated_as_zero() {
        let out = expanded_unified_diff("f.txt", "a\nb\nc", "a\nX\nc", -5);
        let expected = "--- a/f.txt\n+++ b/f.txt\n@@ -2,1 +2,1 @@\n-b\n+X\n";
        assert_eq!(out, expected);
    }

    #[test]
    fn test_expanded_diff_multiple_hunks() {
        let old: Vec<String> = (1..=20).map(|n| n.to_string()).collect();
        let mut new = old.clone();
        new[2] = "X".into();
        new[15] = "Y".into();
        let out =
            expanded_unified_diff("f.txt", &old.join("\n"), &new.join("\n"), 1);
        assert_eq!(out.matches("@@").count(), 2);
        assert!(out.contains("-3\n+X\n"));
        assert!(out.contains("-16\n+Y\n"));
    }

    #[test]
    fn test_expanded_diff_no_sync_point_emits_trailing_hunk() {
        // Every line differs and the window never resynchronizes.
        let old: Vec<String> = (0..60).map(|n| format!("old{n}")).collect();
        let new: Vec<String> = (0..60).map(|n| format!("new{n}")).collect();
        let out =
            expanded_unified_diff("f.txt", &old.join("\n"), &new.join("\n"), 2);
        assert_eq!(out.matches("@@").count(), 1);
        assert!(out.contains("@@ -1,60 +1,60 @@"));
    }
}
