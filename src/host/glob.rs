//! Glob matching shared by the hosts.
//!
//! Patterns are gitignore-style globs (via `ignore::overrides`). Relative
//! patterns are resolved against the host's current directory, and every
//! pattern is anchored at the file system root so `*.txt` only matches in
//! the directory it names. A leading `!` excludes.

use crate::path::StandardizedPath;
use ignore::overrides::{Override, OverrideBuilder};
use std::io;

pub struct GlobMatcher {
    overrides: Override,
    bases: Vec<StandardizedPath>,
}

impl GlobMatcher {
    pub fn new(patterns: &[String], current_dir: &str, case_sensitive: bool) -> io::Result<Self> {
        let cwd = StandardizedPath::new(current_dir);
        let root = cwd.ancestors().last().unwrap_or_else(|| cwd.clone());

        let mut builder = OverrideBuilder::new(root.as_str());
        builder
            .case_insensitive(!case_sensitive)
            .map_err(io::Error::other)?;

        let mut bases: Vec<StandardizedPath> = Vec::new();
        for pattern in patterns {
            let (negated, body) = match pattern.strip_prefix('!') {
                Some(body) => (true, body),
                None => (false, pattern.as_str()),
            };

            let absolute = cwd.join(body);
            let anchored = absolute
                .as_str()
                .strip_prefix(root.as_str())
                .unwrap_or(absolute.as_str());

            let glob = if negated {
                format!("!/{anchored}")
            } else {
                format!("/{anchored}")
            };
            builder.add(&glob).map_err(io::Error::other)?;

            if !negated {
                bases.push(glob_base(&absolute));
            }
        }

        // Nested bases would walk the same entries twice.
        bases.sort();
        bases.dedup();
        let bases = bases
            .iter()
            .filter(|base| !bases.iter().any(|other| base.is_descendant_of(other)))
            .cloned()
            .collect();

        Ok(Self {
            overrides: builder.build().map_err(io::Error::other)?,
            bases,
        })
    }

    /// Whether the file at `path` is selected by the patterns.
    pub fn is_match(&self, path: &str) -> bool {
        !self.bases.is_empty() && self.overrides.matched(path, false).is_whitelist()
    }

    /// Directories that contain every possible match.
    pub fn bases(&self) -> &[StandardizedPath] {
        &self.bases
    }
}

/// Longest directory prefix free of glob metacharacters.
fn glob_base(pattern: &StandardizedPath) -> StandardizedPath {
    let text = pattern.as_str();
    match text.find(['*', '?', '[', '{']) {
        None => pattern.parent().unwrap_or_else(|| pattern.clone()),
        Some(idx) => {
            let prefix = &text[..idx];
            match prefix.rfind('/') {
                Some(cut) => StandardizedPath::new(&prefix[..=cut]),
                None => pattern.clone(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_relative_pattern_is_anchored_to_cwd() {
        let matcher = GlobMatcher::new(&patterns(&["src/*.rs"]), "/work", true).unwrap();
        assert!(matcher.is_match("/work/src/lib.rs"));
        assert!(!matcher.is_match("/work/src/nested/lib.rs"));
        assert!(!matcher.is_match("/other/src/lib.rs"));
    }

    #[test]
    fn test_recursive_pattern_and_exclusion() {
        let matcher =
            GlobMatcher::new(&patterns(&["/work/**/*.txt", "!/work/skip/**"]), "/", true).unwrap();
        assert!(matcher.is_match("/work/a.txt"));
        assert!(matcher.is_match("/work/deep/er/b.txt"));
        assert!(!matcher.is_match("/work/skip/c.txt"));
        assert_eq!(matcher.bases(), &[StandardizedPath::new("/work")]);
    }

    #[test]
    fn test_nested_bases_collapse() {
        let matcher =
            GlobMatcher::new(&patterns(&["/a/*.txt", "/a/b/*.txt"]), "/", true).unwrap();
        assert_eq!(matcher.bases(), &[StandardizedPath::new("/a")]);
    }

    #[test]
    fn test_no_patterns_matches_nothing() {
        let matcher = GlobMatcher::new(&[], "/", true).unwrap();
        assert!(!matcher.is_match("/a.txt"));
    }
}
