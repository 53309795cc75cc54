//! Architectural Enforcement
//!
//! Source scanners shared by the enforcement tests in `tests/`:
//! - No sleep() calls in production code
//! - No blocking I/O outside startup paths
//! - No unwrap()/expect() or process-wide mutable state in the core
//! - The core stays free of UI crates
//!
//! "Production code" is everything in a source file before its first
//! `#[cfg(test)]` line. Test modules sit at the bottom of each file in this
//! workspace, so the cut is reliable.

use std::fs;
use std::path::{Path, PathBuf};

/// A rule violation at a specific source line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub file: PathBuf,
    pub line: usize,
    pub text: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} - {}", self.file.display(), self.line, self.text)
    }
}

/// Workspace root (two levels above this package)
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// Source directory of the core library
#[must_use]
pub fn core_src() -> PathBuf {
    workspace_root().join("conductor/core/src")
}

/// All `.rs` files under `dir`, sorted for stable output
#[must_use]
pub fn rust_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Production lines of a file as `(line_number, code)` pairs
///
/// Stops at the first `#[cfg(test)]`, drops line comments and doc comments.
#[must_use]
pub fn production_lines(path: &Path) -> Vec<(usize, String)> {
    let Ok(content) = fs::read_to_string(path) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("#[cfg(test)]") {
            break;
        }
        if trimmed.starts_with("//") {
            continue;
        }
        let code = strip_line_comment(line);
        if !code.trim().is_empty() {
            out.push((idx + 1, code.to_string()));
        }
    }
    out
}

/// `line` up to its trailing `//` comment, if any
///
/// A `//` inside a string literal (`"http://..."`) is code, not a comment.
#[must_use]
pub fn strip_line_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut in_string = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if in_string => i += 1,
            b'"' => in_string = !in_string,
            // char literal such as '"'
            b'\'' if !in_string && bytes.get(i + 2) == Some(&b'\'') => i += 2,
            b'/' if !in_string && bytes.get(i + 1) == Some(&b'/') => return &line[..i],
            _ => {}
        }
        i += 1;
    }
    line
}

/// Scan every production line under `dir` with `matches`
///
/// `exempt` receives the path relative to `dir` and can skip whole files.
pub fn scan<M, E>(dir: &Path, matches: M, exempt: E) -> Vec<Violation>
where
    M: Fn(&str) -> bool,
    E: Fn(&Path) -> bool,
{
    let mut violations = Vec::new();
    for file in rust_files(dir) {
        let relative = file.strip_prefix(dir).unwrap_or(&file);
        if exempt(relative) {
            continue;
        }
        for (line, code) in production_lines(&file) {
            if matches(&code) {
                violations.push(Violation {
                    file: relative.to_path_buf(),
                    line,
                    text: code.trim().to_string(),
                });
            }
        }
    }
    violations
}

/// Print violations with guidance and fail the test
pub fn report(rule: &str, violations: &[Violation], guidance: &[&str]) {
    if violations.is_empty() {
        return;
    }

    eprintln!("\n❌ {rule}\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    for line in guidance {
        eprintln!("  {line}");
    }

    panic!(
        "\nFound {} violation(s) of: {}\nFix these before merging!",
        violations.len(),
        rule
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("sample.rs");
        fs::write(
            &file,
            "/// docs\nfn real() {} // trailing\n\n#[cfg(test)]\nmod tests { fn t() { x.unwrap(); } }\n",
        )
        .unwrap();

        let lines = production_lines(&file);
        assert_eq!(lines, vec![(2, "fn real() {} ".to_string())]);
    }

    #[test]
    fn test_urls_in_strings_do_not_hide_code() {
        let line = r#"let url = "http://localhost:5000"; client.get(url).send().unwrap();"#;
        assert_eq!(strip_line_comment(line), line);

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("remote.rs");
        fs::write(&file, format!("{line}\n")).unwrap();
        let hits = scan(dir.path(), |code| code.contains(".unwrap()"), |_| false);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].line, 1);
    }

    #[test]
    fn test_trailing_comment_after_string_is_cut() {
        assert_eq!(
            strip_line_comment(r#"let s = "a//b"; // note"#),
            r#"let s = "a//b"; "#
        );
        assert_eq!(strip_line_comment(r#"let q = '"'; // quote"#), r#"let q = '"'; "#);
        assert_eq!(
            strip_line_comment(r#"let e = "say \"hi\" //"; x // y"#),
            r#"let e = "say \"hi\" //"; x "#
        );
    }

    #[test]
    fn test_core_sources_are_found() {
        let files = rust_files(&core_src());
        assert!(files.iter().any(|f| f.ends_with("lib.rs")));
        assert!(files.iter().any(|f| f.ends_with("conductor.rs")));
    }
}
