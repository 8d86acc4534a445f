//! Standardized absolute paths.
//!
//! Every path that enters the transaction layer is converted to a
//! [`StandardizedPath`]: absolute, `/`-separated, lexically normalized and
//! without a trailing slash (roots excepted). Two spellings of one location
//! compare equal once standardized, apart from letter casing, which
//! [`crate::fs::PathCasingMaintainer`] handles for case-insensitive hosts.

use std::fmt;
use std::path::Path;

/// Absolute, normalized, `/`-separated path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StandardizedPath(String);

impl StandardizedPath {
    /// Standardizes `path`, resolving relative paths against `/`.
    pub fn new(path: &str) -> Self {
        standardize(path, &Self::root())
    }

    /// The POSIX root, `/`.
    pub fn root() -> Self {
        StandardizedPath("/".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.len() == root_len(&self.0)
    }

    /// Containing directory. `None` for a root.
    pub fn parent(&self) -> Option<StandardizedPath> {
        if self.is_root() {
            return None;
        }

        let root_len = root_len(&self.0);
        let idx = self.0.rfind('/')?;
        if idx < root_len {
            Some(StandardizedPath(self.0[..root_len].to_string()))
        } else {
            Some(StandardizedPath(self.0[..idx].to_string()))
        }
    }

    /// Ancestors from the immediate parent up to the root.
    pub fn ancestors(&self) -> impl Iterator<Item = StandardizedPath> {
        std::iter::successors(self.parent(), |p| p.parent())
    }

    /// Resolves `path` against this directory.
    pub fn join(&self, path: &str) -> StandardizedPath {
        standardize(path, self)
    }

    /// Last component, or `""` for a root.
    pub fn file_name(&self) -> &str {
        if self.is_root() {
            return "";
        }
        self.0.rsplit('/').next().unwrap_or("")
    }

    /// True if `self` lies strictly below `ancestor`.
    pub fn is_descendant_of(&self, ancestor: &StandardizedPath) -> bool {
        if self.0.len() <= ancestor.0.len() || !self.0.starts_with(&ancestor.0) {
            return false;
        }
        ancestor.is_root() || self.0.as_bytes()[ancestor.0.len()] == b'/'
    }

    pub fn is_descendant_or_equal_of(&self, ancestor: &StandardizedPath) -> bool {
        self == ancestor || self.is_descendant_of(ancestor)
    }

    /// Display form relative to `base`, with forward slashes.
    ///
    /// Falls back to the absolute path when no relative form exists.
    pub fn relative_to(&self, base: &Path) -> String {
        match pathdiff::diff_paths(Path::new(&self.0), base) {
            Some(rel) if rel.as_os_str().is_empty() => ".".to_string(),
            Some(rel) => standardize_slashes(&rel.to_string_lossy()),
            None => self.0.clone(),
        }
    }

    /// Key under which case-insensitive stores compare this path.
    pub fn case_fold_key(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for StandardizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StandardizedPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl AsRef<Path> for StandardizedPath {
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}

impl From<StandardizedPath> for String {
    fn from(path: StandardizedPath) -> Self {
        path.0
    }
}

/// Replaces backslashes with forward slashes.
pub fn standardize_slashes(path: &str) -> String {
    path.replace('\\', "/")
}

/// Makes `path` absolute against `current_dir` and normalizes it lexically.
///
/// `.` segments and empty segments are dropped, and `..` pops a segment but
/// never climbs above the root.
pub fn standardize(path: &str, current_dir: &StandardizedPath) -> StandardizedPath {
    let path = standardize_slashes(path);
    let full = if root_len(&path) > 0 {
        path
    } else {
        format!("{}/{}", current_dir.as_str(), path)
    };

    let root_len = root_len(&full);
    let mut root = full[..root_len].to_string();
    if !root.ends_with('/') {
        root.push('/');
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in full[root_len..].split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    StandardizedPath(root + &segments.join("/"))
}

/// Length of the root prefix: `/`, `C:/` or `C:`. Zero for relative paths.
fn root_len(path: &str) -> usize {
    if path.starts_with('/') {
        return 1;
    }

    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        if bytes.get(2) == Some(&b'/') { 3 } else { 2 }
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standardize_normalizes_segments() {
        let cwd = StandardizedPath::new("/home/user");
        assert_eq!(standardize("a/./b/../c", &cwd).as_str(), "/home/user/a/c");
        assert_eq!(standardize("/x//y/", &cwd).as_str(), "/x/y");
        assert_eq!(standardize("../../../..", &cwd).as_str(), "/");
        assert_eq!(standardize("C:\\dir\\file.txt", &cwd).as_str(), "C:/dir/file.txt");
    }

    #[test]
    fn test_parent_chain_ends_at_root() {
        let path = StandardizedPath::new("/a/b/c");
        let ancestors: Vec<_> = path.ancestors().map(String::from).collect();
        assert_eq!(ancestors, vec!["/a/b", "/a", "/"]);
        assert!(StandardizedPath::root().parent().is_none());

        let drive = StandardizedPath::new("C:/a");
        assert_eq!(drive.parent().unwrap().as_str(), "C:/");
        assert!(drive.parent().unwrap().is_root());
    }

    #[test]
    fn test_descendant_checks_respect_segment_boundaries() {
        let a = StandardizedPath::new("/a");
        assert!(StandardizedPath::new("/a/b").is_descendant_of(&a));
        assert!(!StandardizedPath::new("/ab").is_descendant_of(&a));
        assert!(!a.is_descendant_of(&a));
        assert!(a.is_descendant_or_equal_of(&a));
        assert!(a.is_descendant_of(&StandardizedPath::root()));
    }

    #[test]
    fn test_file_name_and_join() {
        let dir = StandardizedPath::new("/a/b");
        assert_eq!(dir.file_name(), "b");
        assert_eq!(dir.join("c.txt").as_str(), "/a/b/c.txt");
        assert_eq!(dir.join("/abs").as_str(), "/abs");
        assert_eq!(StandardizedPath::root().file_name(), "");
    }

    #[test]
    fn test_relative_display() {
        let path = StandardizedPath::new("/work/src/lib.rs");
        assert_eq!(path.relative_to(Path::new("/work")), "src/lib.rs");
        assert_eq!(
            StandardizedPath::new("/work").relative_to(Path::new("/work")),
            "."
        );
    }
}
