use std::path::{Path, PathBuf};
use std::process::Command;

const MAX_LINES: usize = 750;

const CHECKED_EXTENSIONS: &[&str] = &["rs", "toml"];

const EXCLUDED_DIRS: &[&str] = &["target", ".git", "examples"];

const EXCLUDED_FILES: &[&str] = &["Cargo.lock"];

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/main");

    let sha = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                String::from_utf8(output.stdout)
                    .ok()
                    .map(|s| s.trim().to_string())
            } else {
                None
            }
        })
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=FRAME_REGISTRY_GIT_SHA={}", sha);

    let root = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into()));
    let files = collect_files_to_check(&root);
    for file in &files {
        println!("cargo:rerun-if-changed={}", file.display());
    }

    enforce_line_limits(&root, &files);
    let rust_files: Vec<PathBuf> = files
        .into_iter()
        .filter(|p| {
            p.extension().and_then(|e| e.to_str()) == Some("rs")
                && p.file_name().and_then(|n| n.to_str()) != Some("build.rs")
        })
        .collect();
    enforce_no_dead_code_allows(&root, &rust_files);
    enforce_no_test_skips(&root, &rust_files);
}

fn enforce_line_limits(root: &Path, files: &[PathBuf]) {
    let mut violations = Vec::new();
    for file in files {
        match std::fs::read_to_string(file) {
            Ok(content) => {
                let line_count = count_non_empty_lines(&content);
                if line_count > MAX_LINES {
                    violations.push((relative(root, file), line_count));
                }
            }
            Err(e) => {
                println!(
                    "cargo:warning=Could not read file {}: {}",
                    relative(root, file).display(),
                    e
                );
            }
        }
    }

    if !violations.is_empty() {
        eprintln!("\n========================================");
        eprintln!("FILE LINE LIMIT EXCEEDED (max {} lines)", MAX_LINES);
        eprintln!("========================================");
        for (path, lines) in &violations {
            eprintln!(
                "  {} - {} lines (exceeds by {})",
                path.display(),
                lines,
                lines - MAX_LINES
            );
        }
        eprintln!("========================================\n");
        eprintln!("Please split these files into smaller modules.\n");
        panic!(
            "Build failed: {} file(s) exceed the {} line limit",
            violations.len(),
            MAX_LINES
        );
    }
}

fn collect_files_to_check(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    walk_directory(root, root, &mut files);
    files.sort();
    files
}

fn walk_directory(dir: &Path, root: &Path, files: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        let path = entry.path();

        if path.is_dir() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if EXCLUDED_DIRS.contains(&name) {
                    continue;
                }
            }
            walk_directory(&path, root, files);
        } else if should_check_file(&path, root) {
            files.push(path);
        }
    }
}

fn should_check_file(path: &Path, root: &Path) -> bool {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(e) => e,
        None => return false,
    };
    if !CHECKED_EXTENSIONS.contains(&ext) {
        return false;
    }
    let rel_str = relative(root, path).to_string_lossy().to_string();
    !EXCLUDED_FILES.contains(&rel_str.as_str())
}

fn relative(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}

fn count_non_empty_lines(content: &str) -> usize {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .count()
}

fn enforce_no_dead_code_allows(root: &Path, rust_files: &[PathBuf]) {
    let mut violations: Vec<(PathBuf, usize, String)> = Vec::new();

    for file in rust_files {
        if let Ok(content) = std::fs::read_to_string(file) {
            for (line_num, line) in content.lines().enumerate() {
                let trimmed = line.trim();
                if (trimmed.starts_with("#[allow(") || trimmed.starts_with("#![allow("))
                    && trimmed.contains("dead_code")
                {
                    violations.push((relative(root, file), line_num + 1, trimmed.to_string()));
                }
            }
        }
    }

    if !violations.is_empty() {
        eprintln!("\n========================================");
        eprintln!("#[allow(dead_code)] IS NOT ALLOWED");
        eprintln!("========================================");
        for (path, line_num, line) in &violations {
            eprintln!("  {}:{}", path.display(), line_num);
            eprintln!("    {}", line);
        }
        eprintln!("========================================");
        eprintln!("DELETE unused code, or gate test-only code with #[cfg(test)].\n");
        panic!(
            "Build failed: {} #[allow(dead_code)] occurrence(s) found. Remove the dead code.",
            violations.len()
        );
    }
}

/// Bans tests that silently skip instead of failing.
///
/// A test that returns early without doing work hides failures. If a test
/// can't run, it should FAIL, not silently pass.
fn enforce_no_test_skips(root: &Path, rust_files: &[PathBuf]) {
    let skip_patterns = ["Skipping test", "skipping test", "Test skipped", "test skipped"];

    let mut violations: Vec<(PathBuf, usize, String)> = Vec::new();

    for file in rust_files {
        let Ok(content) = std::fs::read_to_string(file) else {
            continue;
        };
        let lines: Vec<&str> = content.lines().collect();

        let mut in_test_fn = false;
        let mut test_fn_start = 0;
        let mut test_fn_name = String::new();
        let mut brace_depth = 0i32;

        for (i, line) in lines.iter().enumerate() {
            let trimmed = line.trim();

            if trimmed == "#[test]" {
                if let Some(signature) = lines.iter().skip(i + 1).take(4).find(|l| l.contains("fn ")) {
                    test_fn_start = i + 1;
                    test_fn_name = signature
                        .split_once("fn ")
                        .and_then(|(_, rest)| rest.split_once('('))
                        .map(|(name, _)| name.trim().to_string())
                        .unwrap_or_default();
                    in_test_fn = true;
                    brace_depth = 0;
                }
            }

            if !in_test_fn {
                continue;
            }
            for c in line.chars() {
                if c == '{' {
                    brace_depth += 1;
                } else if c == '}' {
                    brace_depth -= 1;
                    if brace_depth == 0 {
                        in_test_fn = false;
                    }
                }
            }

            if let Some(pattern) = skip_patterns.iter().find(|p| line.contains(*p)) {
                violations.push((
                    relative(root, file),
                    test_fn_start,
                    format!("test `{}` contains skip pattern: {}", test_fn_name, pattern),
                ));
                in_test_fn = false;
            } else if in_test_fn && trimmed == "return;" && brace_depth > 1 {
                violations.push((
                    relative(root, file),
                    test_fn_start,
                    format!("test `{}` has conditional early return (silent skip)", test_fn_name),
                ));
                in_test_fn = false;
            }
        }
    }

    if !violations.is_empty() {
        eprintln!("\n========================================");
        eprintln!("SILENT TEST SKIPS ARE NOT ALLOWED");
        eprintln!("========================================");
        for (path, line_num, message) in &violations {
            eprintln!("  {}:{}", path.display(), line_num);
            eprintln!("    {}", message);
        }
        eprintln!("========================================");
        eprintln!("Tests must FAIL if they cannot run. Use assert!() on preconditions.\n");
        panic!(
            "Build failed: {} silent test skip(s) found. Make tests fail instead of skip.",
            violations.len()
        );
    }
}
