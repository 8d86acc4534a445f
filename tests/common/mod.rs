//! Shared fixtures for stagefs integration tests.
//!
//! Each fixture lives in its own temporary directory, laid out as:
//!
//! ```text
//! notes.txt
//! a/one.txt
//! a/sub/two.txt
//! b/three.txt
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Creates the fixture tree described above.
#[allow(unused)]
pub fn create_test_tree() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();

    fs::create_dir_all(root.join("a/sub")).unwrap();
    fs::create_dir_all(root.join("b")).unwrap();
    fs::write(root.join("notes.txt"), "notes").unwrap();
    fs::write(root.join("a/one.txt"), "one").unwrap();
    fs::write(root.join("a/sub/two.txt"), "two").unwrap();
    fs::write(root.join("b/three.txt"), "three").unwrap();

    temp
}

/// Canonical root of a fixture, so symlinked temp dirs compare equal.
#[allow(unused)]
pub fn root_of(temp: &TempDir) -> PathBuf {
    temp.path().canonicalize().unwrap()
}

/// Writes `text` as a plan file in its own directory, outside any fixture.
#[allow(unused)]
pub fn write_plan(text: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let plan = dir.path().join("plan.txt");
    fs::write(&plan, text).unwrap();
    (dir, plan)
}

/// Sorted relative paths of every file below `root`.
#[allow(unused)]
pub fn list_files(root: &Path) -> Vec<String> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                let rel = pathdiff::diff_paths(&path, root).unwrap();
                files.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
    }

    files.sort();
    files
}
