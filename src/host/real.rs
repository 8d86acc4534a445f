//! [`FileSystemHost`] backed by the operating system.
//!
//! Blocking methods use `std::fs`; async methods use `tokio::fs`, or run the
//! blocking implementation on tokio's blocking pool for recursive moves,
//! copies and globbing. The async methods must be awaited inside a tokio
//! runtime.

use super::{DirEntry, FileSystemHost, GlobMatcher};
use crate::path::standardize_slashes;
use async_trait::async_trait;
use ignore::WalkBuilder;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct RealFileSystemHost {
    current_dir: PathBuf,
}

impl RealFileSystemHost {
    /// Host rooted at the process working directory.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            current_dir: std::env::current_dir()?,
        })
    }

    /// Host that resolves relative paths against `dir` instead of the
    /// process working directory.
    pub fn with_current_directory(dir: impl Into<PathBuf>) -> Self {
        Self {
            current_dir: dir.into(),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.current_dir.join(path)
    }

    fn display(path: &Path) -> String {
        let text = standardize_slashes(&path.to_string_lossy());
        // Verbatim prefix produced by canonicalize on Windows.
        match text.strip_prefix("//?/") {
            Some(rest) => rest.to_string(),
            None => text,
        }
    }

    /// Checks if paths are on same filesystem.
    ///
    /// Determines if atomic `rename()` is possible, or if cross-filesystem
    /// copy+delete is required.
    fn is_same_filesystem(path1: &Path, path2: &Path) -> io::Result<bool> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            let meta1 = fs::metadata(path1)?;
            let meta2_parent = path2.parent().unwrap_or(path2);
            let meta2 = fs::metadata(meta2_parent)?;
            Ok(meta1.dev() == meta2.dev())
        }

        #[cfg(not(unix))]
        {
            let path1_str = path1.to_string_lossy();
            let path2_str = path2.to_string_lossy();

            if path1_str.len() >= 2 && path2_str.len() >= 2 {
                Ok(path1_str.chars().next() == path2_str.chars().next())
            } else {
                Ok(true)
            }
        }
    }

    /// Recursively copies a directory tree, merging into `to` if it exists.
    fn copy_dir_recursive(from: &Path, to: &Path) -> io::Result<()> {
        fs::create_dir_all(to)?;

        for entry in fs::read_dir(from)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let from_path = entry.path();
            let to_path = to.join(entry.file_name());

            if file_type.is_dir() {
                Self::copy_dir_recursive(&from_path, &to_path)?;
            } else {
                fs::copy(&from_path, &to_path)?;
            }
        }

        Ok(())
    }

    fn copy_entry(from: &Path, to: &Path) -> io::Result<()> {
        let metadata = fs::metadata(from)?;

        if metadata.is_dir() {
            return Self::copy_dir_recursive(from, to);
        }

        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(from, to)?;
        Ok(())
    }

    fn move_entry(from: &Path, to: &Path) -> io::Result<()> {
        let metadata = fs::metadata(from)?;

        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }

        if metadata.is_dir() && to.is_dir() {
            if fs::read_dir(to)?.next().is_some() {
                Self::copy_dir_recursive(from, to)?;
                return fs::remove_dir_all(from);
            }
            fs::remove_dir(to)?;
        }

        if Self::is_same_filesystem(from, to)? {
            fs::rename(from, to)
        } else if metadata.is_dir() {
            Self::copy_dir_recursive(from, to)?;
            fs::remove_dir_all(from)
        } else {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }

    fn walk_matches(&self, patterns: &[String]) -> io::Result<Vec<String>> {
        let matcher = GlobMatcher::new(
            patterns,
            &self.current_directory(),
            self.is_case_sensitive(),
        )?;
        let mut found = BTreeSet::new();

        for base in matcher.bases() {
            if !Path::new(base.as_str()).is_dir() {
                continue;
            }

            for result in WalkBuilder::new(base.as_str())
                .standard_filters(false)
                .build()
            {
                let entry = match result {
                    Ok(entry) => entry,
                    Err(e) => {
                        log::debug!("Skipping unreadable entry during glob: {}", e);
                        continue;
                    }
                };

                if entry.file_type().is_some_and(|t| t.is_file()) {
                    let path = Self::display(entry.path());
                    if matcher.is_match(&path) {
                        found.insert(path);
                    }
                }
            }
        }

        Ok(found.into_iter().collect())
    }
}

async fn run_blocking<T, F>(task: F) -> io::Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(io::Error::other)?
}

#[async_trait]
impl FileSystemHost for RealFileSystemHost {
    fn is_case_sensitive(&self) -> bool {
        !cfg!(any(windows, target_os = "macos"))
    }

    fn current_directory(&self) -> String {
        Self::display(&self.current_dir)
    }

    fn realpath_sync(&self, path: &str) -> io::Result<String> {
        Ok(Self::display(&fs::canonicalize(self.resolve(path))?))
    }

    fn delete_sync(&self, path: &str) -> io::Result<()> {
        let path = self.resolve(path);
        if fs::metadata(&path)?.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        }
    }

    fn read_dir_sync(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();

        for entry in fs::read_dir(self.resolve(path))? {
            let entry = entry?;
            let mut file_type = entry.file_type()?;
            if file_type.is_symlink() {
                file_type = fs::metadata(entry.path())?.file_type();
            }

            entries.push(DirEntry {
                path: Self::display(&entry.path()),
                is_file: file_type.is_file(),
                is_directory: file_type.is_dir(),
            });
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    fn read_file_sync(&self, path: &str) -> io::Result<String> {
        fs::read_to_string(self.resolve(path))
    }

    fn write_file_sync(&self, path: &str, text: &str) -> io::Result<()> {
        let path = self.resolve(path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, text)
    }

    fn mkdir_sync(&self, path: &str) -> io::Result<()> {
        fs::create_dir_all(self.resolve(path))
    }

    fn move_sync(&self, src: &str, dest: &str) -> io::Result<()> {
        Self::move_entry(&self.resolve(src), &self.resolve(dest))
    }

    fn copy_sync(&self, src: &str, dest: &str) -> io::Result<()> {
        Self::copy_entry(&self.resolve(src), &self.resolve(dest))
    }

    fn file_exists_sync(&self, path: &str) -> bool {
        self.resolve(path).is_file()
    }

    fn directory_exists_sync(&self, path: &str) -> bool {
        self.resolve(path).is_dir()
    }

    fn glob_sync(&self, patterns: &[String]) -> io::Result<Vec<String>> {
        self.walk_matches(patterns)
    }

    async fn delete(&self, path: &str) -> io::Result<()> {
        let path = self.resolve(path);
        if tokio::fs::metadata(&path).await?.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        }
    }

    async fn read_file(&self, path: &str) -> io::Result<String> {
        tokio::fs::read_to_string(self.resolve(path)).await
    }

    async fn write_file(&self, path: &str, text: &str) -> io::Result<()> {
        let path = self.resolve(path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, text).await
    }

    async fn mkdir(&self, path: &str) -> io::Result<()> {
        tokio::fs::create_dir_all(self.resolve(path)).await
    }

    async fn move_path(&self, src: &str, dest: &str) -> io::Result<()> {
        let (src, dest) = (self.resolve(src), self.resolve(dest));
        run_blocking(move || Self::move_entry(&src, &dest)).await
    }

    async fn copy(&self, src: &str, dest: &str) -> io::Result<()> {
        let (src, dest) = (self.resolve(src), self.resolve(dest));
        run_blocking(move || Self::copy_entry(&src, &dest)).await
    }

    async fn file_exists(&self, path: &str) -> bool {
        tokio::fs::metadata(self.resolve(path))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    async fn directory_exists(&self, path: &str) -> bool {
        tokio::fs::metadata(self.resolve(path))
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    async fn glob(&self, patterns: &[String]) -> io::Result<Vec<String>> {
        let host = self.clone();
        let patterns = patterns.to_vec();
        run_blocking(move || host.walk_matches(&patterns)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn host_in(temp: &TempDir) -> RealFileSystemHost {
        RealFileSystemHost::with_current_directory(temp.path())
    }

    #[test]
    fn test_write_and_read_relative_path() {
        let temp = TempDir::new().unwrap();
        let host = host_in(&temp);

        host.write_file_sync("nested/file.txt", "content").unwrap();

        assert!(temp.path().join("nested/file.txt").exists());
        assert_eq!(host.read_file_sync("nested/file.txt").unwrap(), "content");
    }

    #[test]
    fn test_move_directory_creates_parent() {
        let temp = TempDir::new().unwrap();
        let host = host_in(&temp);
        fs::create_dir(temp.path().join("old_dir")).unwrap();
        fs::write(temp.path().join("old_dir/file.txt"), "content").unwrap();

        host.move_sync("old_dir", "nested/path/new_dir").unwrap();

        assert!(!temp.path().join("old_dir").exists());
        assert_eq!(
            fs::read_to_string(temp.path().join("nested/path/new_dir/file.txt")).unwrap(),
            "content"
        );
    }

    #[test]
    fn test_move_directory_merges_into_non_empty_target() {
        let temp = TempDir::new().unwrap();
        let host = host_in(&temp);
        fs::create_dir_all(temp.path().join("src")).unwrap();
        fs::create_dir_all(temp.path().join("dest")).unwrap();
        fs::write(temp.path().join("src/a.txt"), "a").unwrap();
        fs::write(temp.path().join("dest/b.txt"), "b").unwrap();

        host.move_sync("src", "dest").unwrap();

        assert!(!temp.path().join("src").exists());
        assert!(temp.path().join("dest/a.txt").exists());
        assert!(temp.path().join("dest/b.txt").exists());
    }

    #[test]
    fn test_move_missing_source_is_not_found() {
        let temp = TempDir::new().unwrap();
        let host = host_in(&temp);

        let err = host.move_sync("missing", "dest").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_copy_and_delete_directory() {
        let temp = TempDir::new().unwrap();
        let host = host_in(&temp);
        fs::create_dir_all(temp.path().join("a/b")).unwrap();
        fs::write(temp.path().join("a/b/c.txt"), "c").unwrap();

        host.copy_sync("a", "copy").unwrap();
        host.delete_sync("a").unwrap();

        assert!(!temp.path().join("a").exists());
        assert!(temp.path().join("copy/b/c.txt").exists());
    }

    #[test]
    fn test_read_dir_reports_kinds() {
        let temp = TempDir::new().unwrap();
        let host = host_in(&temp);
        fs::create_dir(temp.path().join("dir")).unwrap();
        fs::write(temp.path().join("file.txt"), "").unwrap();

        let entries = host.read_dir_sync(".").unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].path.ends_with("/dir") && entries[0].is_directory);
        assert!(entries[1].path.ends_with("/file.txt") && entries[1].is_file);
    }

    #[test]
    fn test_glob_walks_bases() {
        let temp = TempDir::new().unwrap();
        let host = host_in(&temp);
        fs::create_dir_all(temp.path().join("src/nested")).unwrap();
        fs::write(temp.path().join("src/lib.rs"), "").unwrap();
        fs::write(temp.path().join("src/nested/mod.rs"), "").unwrap();
        fs::write(temp.path().join("src/notes.md"), "").unwrap();

        let matches = host.glob_sync(&["src/**/*.rs".to_string()]).unwrap();
        assert_eq!(matches.len(), 2);
        assert!(matches.iter().all(|m| m.ends_with(".rs")));
    }

    #[tokio::test]
    async fn test_async_round_trip() {
        let temp = TempDir::new().unwrap();
        let host = host_in(&temp);

        host.write_file("a/b.txt", "async").await.unwrap();
        assert!(host.file_exists("a/b.txt").await);
        assert!(host.directory_exists("a").await);
        assert_eq!(host.read_file("a/b.txt").await.unwrap(), "async");

        host.move_path("a", "moved").await.unwrap();
        assert!(!host.directory_exists("a").await);
        host.delete("moved").await.unwrap();
        assert!(!host.directory_exists("moved").await);
    }
}
