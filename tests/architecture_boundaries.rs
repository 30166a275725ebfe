use std::fs;
use std::path::{Path, PathBuf};

fn rs_files(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().and_then(|s| s.to_str()) == Some("rs") {
                out.push(path);
            }
        }
    }
    out.sort();
    out
}

fn rel(path: &Path) -> String {
    let root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let rel = path
        .strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string();
    rel.replace('\\', "/")
}

#[test]
fn query_and_report_are_pure() {
    let src = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");
    let mut violations = Vec::new();

    for file in [src.join("query.rs"), src.join("report.rs"), src.join("format.rs")] {
        let content = fs::read_to_string(&file).unwrap_or_default();
        for forbidden in [
            "crate::cache",
            "crate::engine",
            "crate::system::platform",
            "tokio",
            "std::fs",
        ] {
            if content.contains(forbidden) {
                violations.push(format!(
                    "{} imports forbidden dependency `{}`",
                    rel(&file),
                    forbidden
                ));
            }
        }
    }

    assert!(
        violations.is_empty(),
        "Pure module layering violations:\n{}",
        violations.join("\n")
    );
}

const PLATFORM_USERS: [&str; 2] = ["src/system/control.rs", "src/system/collector.rs"];

#[test]
fn only_control_and_collector_use_platform_extensions() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");
    let mut violations = Vec::new();

    for file in rs_files(&root) {
        let rel_path = rel(&file);
        if rel_path.starts_with("src/system/platform/")
            || PLATFORM_USERS.contains(&rel_path.as_str())
        {
            continue;
        }
        let content = fs::read_to_string(&file).unwrap_or_default();
        for pattern in ["system::platform", "super::platform", "platform::"] {
            if content.contains(pattern) {
                violations.push(format!("{} reaches platform code via `{}`", rel_path, pattern));
            }
        }
    }

    assert!(
        violations.is_empty(),
        "Platform boundary violations:\n{}",
        violations.join("\n")
    );
}

#[test]
fn target_os_cfg_is_scoped_to_system_platform() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");
    let mut violations = Vec::new();

    for file in rs_files(&root) {
        let content = fs::read_to_string(&file).unwrap_or_default();
        if !content.contains("target_os") {
            continue;
        }

        let rel_path = rel(&file);
        if !rel_path.starts_with("src/system/platform/") {
            violations.push(format!(
                "{} contains `target_os` cfg but is outside allowed boundary",
                rel_path
            ));
        }
    }

    assert!(
        violations.is_empty(),
        "Unexpected target_os cfg usage:\n{}",
        violations.join("\n")
    );
}
