//! Architectural Enforcement
//!
//! Source scanners shared by the enforcement tests in `tests/`:
//! - No blocking I/O inside async functions
//! - No `unwrap()` / `expect()` in production code
//!
//! The scanners work line by line on the source text. They are deliberately
//! simple and can be fooled by unusual formatting; they exist to catch
//! violations early, not to replace review.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source roots checked by the enforcement tests
pub const PRODUCTION_DIRS: &[&str] = &["screenflow/core/src"];

/// Absolute path of a workspace-relative directory
#[must_use]
pub fn workspace_path(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .join(relative)
}

/// A Rust source file read into memory
#[derive(Debug)]
pub struct SourceFile {
    /// Path on disk
    pub path: PathBuf,
    /// File content
    pub content: String,
}

impl SourceFile {
    /// Content split into lines
    #[must_use]
    pub fn lines(&self) -> Vec<&str> {
        self.content.lines().collect()
    }
}

/// Every `.rs` file under `dir`; a missing directory yields nothing
#[must_use]
pub fn rust_files(dir: &Path) -> Vec<SourceFile> {
    if !dir.exists() {
        return Vec::new();
    }

    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .filter_map(|entry| {
            fs::read_to_string(entry.path())
                .ok()
                .map(|content| SourceFile {
                    path: entry.path().to_path_buf(),
                    content,
                })
        })
        .collect()
}

/// Code part of a line (everything before `//`)
#[must_use]
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Kind of function a line sits in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnclosingFn {
    /// Inside an `async fn`
    Async,
    /// Inside a plain `fn`
    Sync,
    /// Not inside any function that could be found
    Unknown,
}

/// Whether a trimmed line declares a function, ignoring visibility
fn declares_fn(line: &str) -> bool {
    let mut rest = line;
    for prefix in ["pub(crate) ", "pub(super) ", "pub "] {
        if let Some(stripped) = rest.strip_prefix(prefix) {
            rest = stripped;
            break;
        }
    }
    rest.starts_with("fn ") || rest.starts_with("async fn ") || rest.starts_with("const fn ")
}

/// Find the function enclosing `lines[idx]` by scanning backwards
#[must_use]
pub fn enclosing_fn(lines: &[&str], idx: usize) -> EnclosingFn {
    for i in (0..idx).rev() {
        let line = lines[i].trim();

        if declares_fn(line) {
            return if line.contains("async fn ") {
                EnclosingFn::Async
            } else {
                EnclosingFn::Sync
            };
        }

        // Stop at module/impl boundaries
        if line.starts_with("mod ") || (line.starts_with("impl") && line.contains('{')) {
            return EnclosingFn::Unknown;
        }
    }
    EnclosingFn::Unknown
}

/// Index of the first line of the file's `#[cfg(test)]` module, if any
#[must_use]
pub fn test_module_start(lines: &[&str]) -> Option<usize> {
    lines
        .iter()
        .position(|line| line.trim().starts_with("#[cfg(test)]"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_async_fn_detection() {
        let code = vec![
            "pub async fn load(&self) {",
            "    let text = std::fs::read_to_string(\"flow.json\");",
            "}",
        ];
        assert_eq!(enclosing_fn(&code, 1), EnclosingFn::Async);
    }

    #[test]
    fn test_sync_fn_detection_with_visibility() {
        let code = vec![
            "pub(crate) fn load_config() {",
            "    let text = std::fs::read_to_string(\"engine.toml\");",
            "}",
        ];
        assert_eq!(enclosing_fn(&code, 1), EnclosingFn::Sync);
    }

    #[test]
    fn test_impl_boundary_stops_scan() {
        let code = vec!["fn helper() {}", "impl Foo {", "    const X: u8 = 1;"];
        assert_eq!(enclosing_fn(&code, 2), EnclosingFn::Unknown);
    }

    #[test]
    fn test_test_module_start() {
        let code = vec!["fn a() {}", "", "#[cfg(test)]", "mod tests {"];
        assert_eq!(test_module_start(&code), Some(2));
        assert_eq!(test_module_start(&code[..2]), None);
    }

    #[test]
    fn test_code_part_strips_comments() {
        assert_eq!(code_part("let x = 1; // x.unwrap()"), "let x = 1; ");
    }
}
