//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Engine code MUST NOT block the runtime. Inside `async fn`, use
//! `tokio::fs`, `tokio::io` and the async `reqwest` client.
//!
//! Blocking calls are acceptable in non-async functions (configuration is
//! loaded before the runtime does any work) and in test code.

use std::path::Path;

use architectural_enforcement::{
    code_part, enclosing_fn, rust_files, test_module_start, workspace_path, EnclosingFn,
    PRODUCTION_DIRS,
};

/// Test that production code does not use blocking I/O in async functions
#[test]
fn test_no_blocking_io_in_production_code() {
    let mut violations = Vec::new();
    for dir in PRODUCTION_DIRS {
        for file in rust_files(&workspace_path(dir)) {
            check_file(&file.path, &file.lines(), &mut violations);
        }
    }

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Blocking I/O calls found in async production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ REQUIRED async I/O:");
        eprintln!("  - tokio::fs::read_to_string().await");
        eprintln!("  - tokio::io::stdin() / tokio::io::stdout()");
        eprintln!("  - reqwest::Client (async)");

        panic!(
            "\nFound {} blocking I/O violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

/// The production sources were found at all
#[test]
fn test_production_sources_are_scanned() {
    let files = rust_files(&workspace_path(PRODUCTION_DIRS[0]));
    assert!(
        files.iter().any(|f| f.path.ends_with("interpreter.rs")),
        "expected to scan the engine sources"
    );
}

fn check_file(path: &Path, lines: &[&str], violations: &mut Vec<String>) {
    let end = test_module_start(lines).unwrap_or(lines.len());

    for (idx, line) in lines[..end].iter().enumerate() {
        let code = code_part(line);

        let reason = if code.contains("std::fs::") {
            "Blocking file I/O"
        } else if code.contains("std::net::") {
            "Blocking network I/O"
        } else if code.contains("std::process::Command") {
            "Blocking process I/O"
        } else if code.contains("reqwest::blocking") {
            "Blocking HTTP client"
        } else if code.contains("std::io::stdin()") || code.contains("std::io::stdout()") {
            "Blocking stdin/stdout"
        } else {
            continue;
        };

        if enclosing_fn(lines, idx) == EnclosingFn::Sync {
            continue;
        }

        violations.push(format!(
            "{}:{} - {}: {}",
            path.display(),
            idx + 1,
            reason,
            line.trim()
        ));
    }
}

#[test]
fn test_detects_fs_in_async_fn() {
    let code = vec![
        "pub async fn load(&self) -> String {",
        "    std::fs::read_to_string(\"flow.json\").unwrap_or_default()",
        "}",
    ];
    let mut violations = Vec::new();
    check_file(Path::new("flow.rs"), &code, &mut violations);
    assert_eq!(violations.len(), 1);
    assert!(violations[0].contains("Blocking file I/O"));
}

#[test]
fn test_allows_fs_in_sync_fn() {
    let code = vec![
        "pub fn load_config() -> String {",
        "    std::fs::read_to_string(\"engine.toml\").unwrap_or_default()",
        "}",
    ];
    let mut violations = Vec::new();
    check_file(Path::new("config.rs"), &code, &mut violations);
    assert!(violations.is_empty());
}
