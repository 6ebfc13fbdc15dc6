//! Per-file LOC counting.

/// Count lines that survive trimming: non-empty and not starting with the
/// single-line comment prefix for the file's (lowercased) extension.
/// Unknown extensions only have empty lines stripped.
#[must_use]
pub fn count_loc(filename: &str, content: &str) -> i64 {
    if content.is_empty() {
        return 0;
    }
    let ext = extension(filename);
    let mut count = 0;
    for line in content.split('\n') {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if is_comment(&ext, trimmed) {
            continue;
        }
        count += 1;
    }
    count
}

fn extension(filename: &str) -> String {
    std::path::Path::new(filename)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

fn is_comment(ext: &str, line: &str) -> bool {
    match ext {
        ".go" | ".js" | ".ts" | ".tsx" | ".jsx" | ".java" | ".c" | ".cpp" | ".rs" | ".swift" => {
            line.starts_with("//")
        }
        ".py" | ".rb" | ".sh" | ".yaml" | ".yml" | ".toml" => line.starts_with('#'),
        ".sql" | ".lua" => line.starts_with("--"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_content() {
        assert_eq!(count_loc("main.go", ""), 0);
    }

    #[test]
    fn test_counts_code_lines() {
        let src = "package main\n\nfunc main() {\n}\n";
        assert_eq!(count_loc("main.go", src), 3);
    }

    #[test]
    fn test_strips_slash_comments() {
        let src = "// header\ncode()\n  // indented comment\nmore()\n";
        assert_eq!(count_loc("a.ts", src), 2);
    }

    #[test]
    fn test_strips_hash_comments() {
        let src = "# comment\nx = 1\n\n# another\ny = 2\n";
        assert_eq!(count_loc("a.py", src), 2);
    }

    #[test]
    fn test_strips_dash_comments() {
        let src = "-- setup\nSELECT 1;\n";
        assert_eq!(count_loc("q.sql", src), 1);
    }

    #[test]
    fn test_unknown_extension_keeps_comment_like_lines() {
        let src = "// not a comment here\ntext\n";
        assert_eq!(count_loc("notes.txt", src), 2);
    }

    #[test]
    fn test_extension_case_insensitive() {
        assert_eq!(count_loc("Main.GO", "// only a comment\n"), 0);
    }

    #[test]
    fn test_no_extension() {
        assert_eq!(count_loc("Makefile", "all:\n\techo hi\n"), 2);
    }
}
