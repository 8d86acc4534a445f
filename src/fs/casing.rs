//! Case-folding path cache.
//!
//! On a case-insensitive host, `/Src/Lib.rs` and `/src/lib.rs` are one entry
//! and must map to one [`super::Directory`]. The first spelling seen for each
//! path prefix becomes canonical; later spellings are rewritten to it one
//! segment at a time so ancestors stay consistent too.

use crate::path::StandardizedPath;
use std::collections::HashMap;

#[derive(Debug)]
pub struct PathCasingMaintainer {
    /// `None` when the host is case-sensitive and no folding is needed.
    mappings: Option<HashMap<String, StandardizedPath>>,
}

impl PathCasingMaintainer {
    pub fn new(case_sensitive: bool) -> Self {
        Self {
            mappings: (!case_sensitive).then(HashMap::new),
        }
    }

    /// Canonical spelling of `path`, recording any unseen prefixes.
    pub fn get_path(&mut self, path: StandardizedPath) -> StandardizedPath {
        let Some(mappings) = self.mappings.as_mut() else {
            return path;
        };

        let mut chain: Vec<StandardizedPath> = path.ancestors().collect();
        chain.reverse();
        chain.push(path);

        let mut canonical = chain[0].clone();
        for spelled in chain.into_iter().skip(1) {
            let candidate = canonical.join(spelled.file_name());
            canonical = mappings
                .entry(candidate.case_fold_key())
                .or_insert(candidate)
                .clone();
        }
        canonical
    }

    /// Canonical spelling of `path` without recording anything.
    ///
    /// Prefixes that were never recorded keep the caller's spelling.
    pub fn resolve(&self, path: StandardizedPath) -> StandardizedPath {
        let Some(mappings) = self.mappings.as_ref() else {
            return path;
        };

        let mut chain: Vec<StandardizedPath> = path.ancestors().collect();
        chain.reverse();
        chain.push(path);

        let mut canonical = chain[0].clone();
        for spelled in chain.into_iter().skip(1) {
            let candidate = canonical.join(spelled.file_name());
            canonical = match mappings.get(&candidate.case_fold_key()) {
                Some(known) => known.clone(),
                None => candidate,
            };
        }
        canonical
    }

    /// Forgets `path` and every path below it.
    ///
    /// Called when a path is deleted or moved away so a later re-creation may
    /// use a different spelling.
    pub fn remove_path(&mut self, path: &StandardizedPath) {
        let Some(mappings) = self.mappings.as_mut() else {
            return;
        };

        let key = path.case_fold_key();
        let prefix = if key.ends_with('/') {
            key.clone()
        } else {
            format!("{key}/")
        };
        mappings.retain(|k, _| k != &key && !k.starts_with(&prefix));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(path: &str) -> StandardizedPath {
        StandardizedPath::new(path)
    }

    #[test]
    fn test_case_sensitive_is_identity() {
        let mut casing = PathCasingMaintainer::new(true);
        assert_eq!(casing.get_path(p("/A/b")), p("/A/b"));
        assert_eq!(casing.get_path(p("/a/B")), p("/a/B"));
    }

    #[test]
    fn test_first_spelling_wins_per_segment() {
        let mut casing = PathCasingMaintainer::new(false);
        assert_eq!(casing.get_path(p("/Src/Lib.rs")), p("/Src/Lib.rs"));
        assert_eq!(casing.get_path(p("/SRC/lib.RS")), p("/Src/Lib.rs"));
        assert_eq!(casing.get_path(p("/src/Other.rs")), p("/Src/Other.rs"));
    }

    #[test]
    fn test_resolve_does_not_record() {
        let mut casing = PathCasingMaintainer::new(false);
        assert_eq!(casing.resolve(p("/New")), p("/New"));
        assert_eq!(casing.get_path(p("/new")), p("/new"));
    }

    #[test]
    fn test_remove_path_forgets_descendants() {
        let mut casing = PathCasingMaintainer::new(false);
        casing.get_path(p("/Dir/Sub/File.txt"));
        casing.get_path(p("/Dirt"));

        casing.remove_path(&p("/dir"));

        assert_eq!(casing.get_path(p("/DIR/sub")), p("/DIR/sub"));
        assert_eq!(casing.resolve(p("/dirt")), p("/Dirt"));
    }
}
