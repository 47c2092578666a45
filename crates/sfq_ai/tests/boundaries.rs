use std::fs;
use std::path::{Path, PathBuf};

fn collect_rs_files(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(p) = stack.pop() {
        let entries = match fs::read_dir(&p) {
            Ok(e) => e,
            Err(_) => continue,
        };
        for ent in entries.flatten() {
            let path = ent.path();
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

fn src_files() -> Vec<PathBuf> {
    let files = collect_rs_files(&PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src"));
    assert!(!files.is_empty());
    files
}

#[test]
fn sfq_ai_leaves_sql_to_sfq_core() {
    // Persistence goes through sfq_core::repo; the AI crate never writes SQL itself.
    for f in src_files() {
        let text = fs::read_to_string(&f).unwrap_or_default();
        for needle in ["SELECT ", "INSERT INTO", "UPDATE ", "DELETE FROM"] {
            assert!(!text.contains(needle), "raw SQL `{needle}` found in {}", f.display());
        }
    }
}

#[test]
fn model_traffic_goes_through_local_client() {
    // Every HTTP caller must hold a LocalClient, which only accepts 127.0.0.1.
    for f in src_files() {
        if f.ends_with("local.rs") {
            continue;
        }
        let text = fs::read_to_string(&f).unwrap_or_default();
        if text.contains("ureq::") {
            assert!(text.contains("LocalClient"), "HTTP without LocalClient in {}", f.display());
        }
    }
}
