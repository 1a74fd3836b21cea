//! Integration Test: Panic Prohibition
//!
//! **Policy**: Engine code propagates failures as `EngineError` / `anyhow`
//! and never panics on bad input. `.unwrap()` and `.expect(` are only allowed
//! in `#[cfg(test)]` modules.

use std::path::Path;

use architectural_enforcement::{
    code_part, rust_files, test_module_start, workspace_path, PRODUCTION_DIRS,
};

#[test]
fn test_no_unwrap_in_production_code() {
    let mut violations = Vec::new();
    for dir in PRODUCTION_DIRS {
        for file in rust_files(&workspace_path(dir)) {
            check_file(&file.path, &file.lines(), &mut violations);
        }
    }

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Panicking calls found in production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ Use `?`, `ok_or_else`, or `unwrap_or` instead.");

        panic!(
            "\nFound {} panic violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

fn check_file(path: &Path, lines: &[&str], violations: &mut Vec<String>) {
    let end = test_module_start(lines).unwrap_or(lines.len());

    for (idx, line) in lines[..end].iter().enumerate() {
        let trimmed = line.trim_start();
        // Doc examples
        if trimmed.starts_with("//") {
            continue;
        }
        let code = code_part(line);
        if code.contains(".unwrap()") || code.contains(".expect(") {
            violations.push(format!("{}:{} - {}", path.display(), idx + 1, line.trim()));
        }
    }
}

#[test]
fn test_detects_unwrap_outside_tests() {
    let code = vec![
        "fn parse(text: &str) -> Value {",
        "    serde_json::from_str(text).unwrap()",
        "}",
        "#[cfg(test)]",
        "mod tests {",
        "    fn helper() { Some(1).unwrap(); }",
        "}",
    ];
    let mut violations = Vec::new();
    check_file(Path::new("flow.rs"), &code, &mut violations);
    assert_eq!(violations.len(), 1);
    assert!(violations[0].starts_with("flow.rs:2"));
}

#[test]
fn test_ignores_unwrap_or_and_doc_examples() {
    let code = vec![
        "/// let x = registry.get(\"a\").unwrap();",
        "fn pick(v: Option<u8>) -> u8 {",
        "    v.unwrap_or(0)",
        "}",
    ];
    let mut violations = Vec::new();
    check_file(Path::new("lib.rs"), &code, &mut violations);
    assert!(violations.is_empty());
}
