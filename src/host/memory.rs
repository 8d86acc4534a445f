//! In-memory [`FileSystemHost`].
//!
//! Keeps directories and file contents in ordered maps behind a lock. Used by
//! tests and by anything that wants to rehearse a batch of operations without
//! touching the disk.

use super::{DirEntry, FileSystemHost, GlobMatcher, not_found};
use crate::path::{StandardizedPath, standardize};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io;

#[derive(Debug, Default)]
struct MemoryState {
    /// Case-fold key (or exact path) → display path.
    directories: BTreeMap<String, StandardizedPath>,
    /// Case-fold key (or exact path) → (display path, contents).
    files: BTreeMap<String, (StandardizedPath, String)>,
}

#[derive(Debug)]
pub struct InMemoryFileSystemHost {
    state: RwLock<MemoryState>,
    case_sensitive: bool,
    current_dir: StandardizedPath,
}

impl Default for InMemoryFileSystemHost {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryFileSystemHost {
    /// Case-sensitive store containing only `/`.
    pub fn new() -> Self {
        Self::with_case_sensitivity(true)
    }

    /// Store where `/A` and `/a` are the same entry.
    pub fn case_insensitive() -> Self {
        Self::with_case_sensitivity(false)
    }

    fn with_case_sensitivity(case_sensitive: bool) -> Self {
        let host = Self {
            state: RwLock::new(MemoryState::default()),
            case_sensitive,
            current_dir: StandardizedPath::root(),
        };
        let root = StandardizedPath::root();
        host.state.write().directories.insert(host.key(&root), root);
        host
    }

    /// Sets the directory relative paths resolve against, creating it.
    pub fn with_current_directory(mut self, dir: &str) -> Self {
        self.current_dir = standardize(dir, &self.current_dir);
        let dir = self.current_dir.clone();
        self.insert_dir_all(&mut self.state.write(), &dir);
        self
    }

    /// Number of files currently stored.
    pub fn file_count(&self) -> usize {
        self.state.read().files.len()
    }

    fn resolve(&self, path: &str) -> StandardizedPath {
        standardize(path, &self.current_dir)
    }

    fn key(&self, path: &StandardizedPath) -> String {
        if self.case_sensitive {
            path.as_str().to_string()
        } else {
            path.case_fold_key()
        }
    }

    fn insert_dir_all(&self, state: &mut MemoryState, dir: &StandardizedPath) {
        let mut chain: Vec<StandardizedPath> = dir.ancestors().collect();
        chain.reverse();
        chain.push(dir.clone());

        for path in chain {
            state
                .directories
                .entry(self.key(&path))
                .or_insert(path);
        }
    }

    /// Keys strictly below `key` in `map`.
    fn keys_below<V>(map: &BTreeMap<String, V>, key: &str) -> Vec<String> {
        let prefix = if key.ends_with('/') {
            key.to_string()
        } else {
            format!("{key}/")
        };
        map.range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Copies `src` (file or directory) to `dest`, merging into existing directories.
    fn copy_entries(
        &self,
        state: &mut MemoryState,
        src: &StandardizedPath,
        dest: &StandardizedPath,
    ) -> io::Result<()> {
        let src_key = self.key(src);

        if let Some((_, text)) = state.files.get(&src_key).cloned() {
            if let Some(parent) = dest.parent() {
                self.insert_dir_all(state, &parent);
            }
            state.files.insert(self.key(dest), (dest.clone(), text));
            return Ok(());
        }

        if !state.directories.contains_key(&src_key) {
            return Err(not_found(src.as_str()));
        }

        self.insert_dir_all(state, dest);
        let src_len = src.as_str().len();

        for key in Self::keys_below(&state.directories, &src_key) {
            let display = state.directories[&key].clone();
            let target = dest.join(display.as_str()[src_len..].trim_start_matches('/'));
            state.directories.insert(self.key(&target), target);
        }

        for key in Self::keys_below(&state.files, &src_key) {
            let (display, text) = state.files[&key].clone();
            let target = dest.join(display.as_str()[src_len..].trim_start_matches('/'));
            state.files.insert(self.key(&target), (target, text));
        }

        Ok(())
    }

    fn remove_entries(&self, state: &mut MemoryState, path: &StandardizedPath) -> io::Result<()> {
        let key = self.key(path);

        if state.files.remove(&key).is_some() {
            return Ok(());
        }

        if path.is_root() || state.directories.remove(&key).is_none() {
            return Err(not_found(path.as_str()));
        }

        for below in Self::keys_below(&state.directories, &key) {
            state.directories.remove(&below);
        }
        for below in Self::keys_below(&state.files, &key) {
            state.files.remove(&below);
        }
        Ok(())
    }
}

#[async_trait]
impl FileSystemHost for InMemoryFileSystemHost {
    fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    fn current_directory(&self) -> String {
        self.current_dir.to_string()
    }

    fn realpath_sync(&self, path: &str) -> io::Result<String> {
        let path = self.resolve(path);
        let state = self.state.read();
        let key = self.key(&path);

        if let Some((display, _)) = state.files.get(&key) {
            return Ok(display.to_string());
        }
        state
            .directories
            .get(&key)
            .map(|display| display.to_string())
            .ok_or_else(|| not_found(path.as_str()))
    }

    fn delete_sync(&self, path: &str) -> io::Result<()> {
        let path = self.resolve(path);
        self.remove_entries(&mut self.state.write(), &path)
    }

    fn read_dir_sync(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        let path = self.resolve(path);
        let state = self.state.read();
        let key = self.key(&path);

        if !state.directories.contains_key(&key) {
            return Err(not_found(path.as_str()));
        }

        let is_child_key = |k: &String| -> bool {
            let rest = k[key.len()..].trim_start_matches('/');
            !rest.is_empty() && !rest.contains('/')
        };

        let mut entries: Vec<DirEntry> = Self::keys_below(&state.directories, &key)
            .iter()
            .filter(|k| is_child_key(k))
            .map(|k| DirEntry::directory(state.directories[k].as_str()))
            .collect();

        entries.extend(
            Self::keys_below(&state.files, &key)
                .iter()
                .filter(|k| is_child_key(k))
                .map(|k| DirEntry::file(state.files[k].0.as_str())),
        );

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    fn read_file_sync(&self, path: &str) -> io::Result<String> {
        let path = self.resolve(path);
        self.state
            .read()
            .files
            .get(&self.key(&path))
            .map(|(_, text)| text.clone())
            .ok_or_else(|| not_found(path.as_str()))
    }

    fn write_file_sync(&self, path: &str, text: &str) -> io::Result<()> {
        let path = self.resolve(path);
        let mut state = self.state.write();
        let key = self.key(&path);

        if state.directories.contains_key(&key) {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("Cannot write file over directory: {path}"),
            ));
        }

        if let Some(parent) = path.parent() {
            self.insert_dir_all(&mut state, &parent);
        }
        state.files.insert(key, (path, text.to_string()));
        Ok(())
    }

    fn mkdir_sync(&self, path: &str) -> io::Result<()> {
        let path = self.resolve(path);
        let mut state = self.state.write();

        if state.files.contains_key(&self.key(&path)) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("A file already exists at {path}"),
            ));
        }

        self.insert_dir_all(&mut state, &path);
        Ok(())
    }

    fn move_sync(&self, src: &str, dest: &str) -> io::Result<()> {
        let src = self.resolve(src);
        let dest = self.resolve(dest);
        let mut state = self.state.write();

        self.copy_entries(&mut state, &src, &dest)?;
        self.remove_entries(&mut state, &src)
    }

    fn copy_sync(&self, src: &str, dest: &str) -> io::Result<()> {
        let src = self.resolve(src);
        let dest = self.resolve(dest);
        self.copy_entries(&mut self.state.write(), &src, &dest)
    }

    fn file_exists_sync(&self, path: &str) -> bool {
        let path = self.resolve(path);
        self.state.read().files.contains_key(&self.key(&path))
    }

    fn directory_exists_sync(&self, path: &str) -> bool {
        let path = self.resolve(path);
        self.state.read().directories.contains_key(&self.key(&path))
    }

    fn glob_sync(&self, patterns: &[String]) -> io::Result<Vec<String>> {
        let matcher = GlobMatcher::new(patterns, self.current_dir.as_str(), self.case_sensitive)?;
        Ok(self
            .state
            .read()
            .files
            .values()
            .map(|(display, _)| display.as_str())
            .filter(|path| matcher.is_match(path))
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_creates_parents() {
        let host = InMemoryFileSystemHost::new();
        host.write_file_sync("/a/b/c.txt", "text").unwrap();

        assert!(host.directory_exists_sync("/a"));
        assert!(host.directory_exists_sync("/a/b"));
        assert_eq!(host.read_file_sync("/a/b/c.txt").unwrap(), "text");
    }

    #[test]
    fn test_read_dir_lists_direct_children_only() {
        let host = InMemoryFileSystemHost::new();
        host.write_file_sync("/a/one.txt", "1").unwrap();
        host.write_file_sync("/a/sub/two.txt", "2").unwrap();

        let entries = host.read_dir_sync("/a").unwrap();
        assert_eq!(
            entries,
            vec![DirEntry::file("/a/one.txt"), DirEntry::directory("/a/sub")]
        );
        assert_eq!(
            host.read_dir_sync("/missing").unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }

    #[test]
    fn test_move_directory_merges_into_existing() {
        let host = InMemoryFileSystemHost::new();
        host.write_file_sync("/src/a.txt", "a").unwrap();
        host.write_file_sync("/src/nested/b.txt", "b").unwrap();
        host.write_file_sync("/dest/keep.txt", "keep").unwrap();

        host.move_sync("/src", "/dest").unwrap();

        assert!(!host.directory_exists_sync("/src"));
        assert_eq!(host.read_file_sync("/dest/a.txt").unwrap(), "a");
        assert_eq!(host.read_file_sync("/dest/nested/b.txt").unwrap(), "b");
        assert_eq!(host.read_file_sync("/dest/keep.txt").unwrap(), "keep");
    }

    #[test]
    fn test_copy_keeps_source() {
        let host = InMemoryFileSystemHost::new();
        host.write_file_sync("/src/a.txt", "a").unwrap();

        host.copy_sync("/src", "/copy").unwrap();

        assert!(host.file_exists_sync("/src/a.txt"));
        assert!(host.file_exists_sync("/copy/a.txt"));
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let host = InMemoryFileSystemHost::new();
        let err = host.delete_sync("/nope").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_delete_directory_is_recursive() {
        let host = InMemoryFileSystemHost::new();
        host.write_file_sync("/a/b/c.txt", "c").unwrap();

        host.delete_sync("/a").unwrap();

        assert!(!host.directory_exists_sync("/a/b"));
        assert!(!host.file_exists_sync("/a/b/c.txt"));
        assert_eq!(host.file_count(), 0);
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let host = InMemoryFileSystemHost::case_insensitive();
        host.write_file_sync("/Dir/File.txt", "x").unwrap();

        assert!(host.file_exists_sync("/dir/file.TXT"));
        assert_eq!(host.realpath_sync("/DIR/FILE.TXT").unwrap(), "/Dir/File.txt");
    }

    #[test]
    fn test_relative_paths_use_current_directory() {
        let host = InMemoryFileSystemHost::new().with_current_directory("/work");
        host.write_file_sync("notes.txt", "n").unwrap();

        assert!(host.file_exists_sync("/work/notes.txt"));
        assert_eq!(host.current_directory(), "/work");
    }

    #[test]
    fn test_glob_matches_files() {
        let host = InMemoryFileSystemHost::new().with_current_directory("/work");
        host.write_file_sync("/work/a.rs", "").unwrap();
        host.write_file_sync("/work/src/b.rs", "").unwrap();
        host.write_file_sync("/work/src/c.txt", "").unwrap();

        let matches = host.glob_sync(&["**/*.rs".to_string()]).unwrap();
        assert_eq!(matches, vec!["/work/a.rs", "/work/src/b.rs"]);
    }
}
