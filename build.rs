//! Embeds the git revision and keeps the source tree within house limits.
//!
//! Checked: every `.rs` file under `src/`, plus the manifest and markdown docs
//! at the crate root. Violations fail the build with one combined report.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

const MAX_FILE_LINES: usize = 750;

const ROOT_DOC_EXTENSIONS: &[&str] = &["md", "toml"];

const DEAD_CODE_ALLOWS: &[&str] = &["allow(dead_code)", "allow(unused)"];

fn main() {
    let root = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into()));

    println!("cargo:rustc-env=CHAT_RELAY_GIT_SHA={}", git_sha(&root));
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=src");

    let mut sources = Vec::new();
    collect_rust_sources(&root.join("src"), &mut sources);
    let docs = root_docs(&root);

    let mut problems = Vec::new();
    for path in sources.iter().chain(&docs) {
        println!("cargo:rerun-if-changed={}", path.display());
        let Ok(content) = fs::read_to_string(path) else {
            continue;
        };
        let shown = path.strip_prefix(&root).unwrap_or(path).display().to_string();

        let lines = content.lines().filter(|l| !l.trim().is_empty()).count();
        if lines > MAX_FILE_LINES {
            problems.push(format!(
                "{}: {} non-empty lines (limit {}); split it into modules",
                shown, lines, MAX_FILE_LINES
            ));
        }

        if path.extension().is_some_and(|ext| ext == "rs") {
            for (number, line) in content.lines().enumerate() {
                let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
                if DEAD_CODE_ALLOWS.iter().any(|allow| compact.contains(allow)) {
                    problems.push(format!(
                        "{}:{}: unused code must be removed, not allowed",
                        shown,
                        number + 1
                    ));
                }
            }
        }
    }

    if !problems.is_empty() {
        for problem in &problems {
            eprintln!("  {}", problem);
        }
        panic!("{} source hygiene problem(s), see above", problems.len());
    }
}

fn git_sha(root: &Path) -> String {
    Command::new("git")
        .arg("-C")
        .arg(root)
        .args(["rev-parse", "--short=12", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|sha| sha.trim().to_string())
        .filter(|sha| !sha.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn collect_rust_sources(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_rust_sources(&path, out);
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            out.push(path);
        }
    }
}

fn root_docs(root: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(root) else {
        return Vec::new();
    };
    entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ROOT_DOC_EXTENSIONS.contains(&ext))
        })
        .collect()
}
