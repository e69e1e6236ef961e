//! Architectural Enforcement
//!
//! Source-scanning helpers shared by the rule tests in `tests/`. Each rule
//! walks the production sources of a crate and reports offending lines as
//! `path:line - code`.
//!
//! Production code is everything in a file before its `#[cfg(test)]` marker,
//! with comments stripped.

use std::fs;
use std::path::{Path, PathBuf};

/// Workspace root (two levels above this package)
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
}

/// One line of production code
#[derive(Debug, Clone)]
pub struct SourceLine {
    /// File the line came from
    pub path: PathBuf,
    /// 1-based line number
    pub number: usize,
    /// Code with any trailing `//` comment removed
    pub code: String,
}

impl std::fmt::Display for SourceLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} - {}", self.path.display(), self.number, self.code.trim())
    }
}

/// All `.rs` files under `dir` (relative to the workspace root)
#[must_use]
pub fn rust_files(dir: &str) -> Vec<PathBuf> {
    let root = workspace_root().join(dir);
    if !root.exists() {
        return Vec::new();
    }
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(|e| e.into_path())
        .collect()
}

/// Production lines of one file
#[must_use]
pub fn production_lines(path: &Path) -> Vec<SourceLine> {
    let Ok(content) = fs::read_to_string(path) else {
        return Vec::new();
    };

    content
        .lines()
        .enumerate()
        .take_while(|(_, line)| !line.trim_start().starts_with("#[cfg(test)]"))
        .map(|(idx, line)| SourceLine {
            path: path.to_path_buf(),
            number: idx + 1,
            code: line.split("//").next().unwrap_or(line).to_string(),
        })
        .filter(|l| !l.code.trim().is_empty())
        .collect()
}

/// Production lines under `dir` matching `predicate`
pub fn find_violations<F>(dir: &str, predicate: F) -> Vec<SourceLine>
where
    F: Fn(&SourceLine) -> bool,
{
    rust_files(dir)
        .iter()
        .flat_map(|path| production_lines(path))
        .filter(|line| predicate(line))
        .collect()
}

/// Panic with a readable report if `violations` is non-empty
pub fn assert_clean(rule: &str, violations: &[SourceLine]) {
    if violations.is_empty() {
        return;
    }
    eprintln!("\n❌ {rule}\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    panic!("\nFound {} violation(s): {rule}", violations.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "fn a() {{}} // trailing\n\n// only comment\n#[cfg(test)]\nmod tests {{ fn b() {{}} }}"
        )
        .unwrap();

        let lines = production_lines(file.path());
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].number, 1);
        assert_eq!(lines[0].code.trim(), "fn a() {}");
    }

    #[test]
    fn test_workspace_root_holds_core_crate() {
        assert!(workspace_root().join("ragchat/core/Cargo.toml").exists());
    }
}
