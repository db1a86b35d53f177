//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles
//! across the `bridge/` crates:
//! - No sleep() calls in production code (wait on I/O or channels instead)
//! - No unwrap()/expect() in the core library (failures are swallowed and
//!   reported as error events, never panics)
//!
//! The helpers here walk production sources only. Everything from a file's
//! `#[cfg(test)]` module onward is test code and is not scanned.

use std::fs;
use std::path::{Path, PathBuf};

/// One offending line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File containing the line
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// The trimmed source line
    pub source: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} - {}", self.path.display(), self.line, self.source)
    }
}

/// Root of the bridge crates, resolved from this package's manifest
pub fn bridge_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../bridge")
}

/// Production `.rs` files under `dir`
///
/// `tests/` directories hold integration tests and are skipped.
pub fn production_sources(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_entry(|e| e.file_name() != "tests" && e.file_name() != "target")
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort();
    files
}

/// Code lines of `content` up to its test module, with comments stripped
///
/// Yields `(line_number, code_part, trimmed_line)`.
pub fn production_lines(content: &str) -> Vec<(usize, &str, &str)> {
    content
        .lines()
        .enumerate()
        .take_while(|(_, line)| !line.trim_start().starts_with("#[cfg(test)]"))
        .filter(|(_, line)| !line.trim_start().starts_with("//"))
        .map(|(idx, line)| {
            let code = line.split("//").next().unwrap_or(line);
            (idx + 1, code, line.trim())
        })
        .collect()
}

/// Scan every production file under `dir` for lines matching `is_violation`
pub fn scan(dir: &Path, is_violation: impl Fn(&str) -> bool) -> Vec<Violation> {
    let mut violations = Vec::new();

    for path in production_sources(dir) {
        let Ok(content) = fs::read_to_string(&path) else {
            continue;
        };

        for (line, code, source) in production_lines(&content) {
            if is_violation(code) {
                violations.push(Violation {
                    path: path.clone(),
                    line,
                    source: source.to_string(),
                });
            }
        }
    }

    violations
}

/// Whether a code fragment calls a sleep function
pub fn calls_sleep(code: &str) -> bool {
    code.contains("::sleep(") || code.contains(".sleep(") || code.contains("sleep_until(")
}

/// Whether a code fragment unwraps or expects
pub fn calls_unwrap(code: &str) -> bool {
    code.contains(".unwrap()") || code.contains(".expect(")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let content = "fn a() {}\n// x.unwrap()\nfn b() { c.unwrap(); }\n#[cfg(test)]\nmod tests { fn t() { d.unwrap(); } }\n";
        let lines = production_lines(content);

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].0, 3);
        assert!(calls_unwrap(lines[1].1));
    }

    #[test]
    fn test_matchers() {
        assert!(calls_sleep("tokio::time::sleep(d).await"));
        assert!(calls_sleep("std::thread::sleep(d)"));
        assert!(!calls_sleep("let sleepy = 1;"));

        assert!(calls_unwrap("x.expect(\"boom\")"));
        assert!(!calls_unwrap("x.unwrap_or_default()"));
        assert!(!calls_unwrap("x.unwrap_or_else(|| 1)"));
    }

    #[test]
    fn test_inline_comment_is_ignored() {
        let lines = production_lines("let x = y; // y.unwrap() would panic\n");
        assert!(!calls_unwrap(lines[0].1));
    }
}
