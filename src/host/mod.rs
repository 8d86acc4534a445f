//! Backing stores the transaction layer delegates physical I/O to.
//!
//! [`FileSystemHost`] is implemented by [`RealFileSystemHost`] (the OS) and
//! [`InMemoryFileSystemHost`] (a fake for tests and previews). Hosts report
//! failures as plain `std::io::Error`; the coordinator translates
//! `ErrorKind::NotFound` into its own not-found variants.
//!
//! ## Contract
//!
//! - `mkdir` is recursive and succeeds when the directory already exists
//! - `move`/`copy` accept files or directories and create the destination's
//!   parent; a directory landing on an existing directory is merged into it
//! - `delete` removes files, or directories recursively
//! - `glob` returns matching files only, sorted

mod glob;
mod memory;
mod real;

pub use glob::GlobMatcher;
pub use memory::InMemoryFileSystemHost;
pub use real::RealFileSystemHost;

use async_trait::async_trait;
use std::io;

/// Entry returned by [`FileSystemHost::read_dir_sync`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Absolute path of the entry.
    pub path: String,
    pub is_file: bool,
    pub is_directory: bool,
}

impl DirEntry {
    pub fn file(path: impl Into<String>) -> Self {
        DirEntry {
            path: path.into(),
            is_file: true,
            is_directory: false,
        }
    }

    pub fn directory(path: impl Into<String>) -> Self {
        DirEntry {
            path: path.into(),
            is_file: false,
            is_directory: true,
        }
    }
}

/// Pluggable storage behind a [`crate::fs::TransactionalFileSystem`].
///
/// The async methods default to their blocking twins, which is right for
/// stores that never block (the in-memory fake).
#[async_trait]
pub trait FileSystemHost: Send + Sync {
    /// Whether `/a` and `/A` name different entries.
    fn is_case_sensitive(&self) -> bool;

    /// Directory relative paths are resolved against.
    fn current_directory(&self) -> String;

    fn realpath_sync(&self, path: &str) -> io::Result<String>;

    fn delete_sync(&self, path: &str) -> io::Result<()>;

    fn read_dir_sync(&self, path: &str) -> io::Result<Vec<DirEntry>>;

    fn read_file_sync(&self, path: &str) -> io::Result<String>;

    fn write_file_sync(&self, path: &str, text: &str) -> io::Result<()>;

    fn mkdir_sync(&self, path: &str) -> io::Result<()>;

    fn move_sync(&self, src: &str, dest: &str) -> io::Result<()>;

    fn copy_sync(&self, src: &str, dest: &str) -> io::Result<()>;

    fn file_exists_sync(&self, path: &str) -> bool;

    fn directory_exists_sync(&self, path: &str) -> bool;

    fn glob_sync(&self, patterns: &[String]) -> io::Result<Vec<String>>;

    async fn delete(&self, path: &str) -> io::Result<()> {
        self.delete_sync(path)
    }

    async fn read_file(&self, path: &str) -> io::Result<String> {
        self.read_file_sync(path)
    }

    async fn write_file(&self, path: &str, text: &str) -> io::Result<()> {
        self.write_file_sync(path, text)
    }

    async fn mkdir(&self, path: &str) -> io::Result<()> {
        self.mkdir_sync(path)
    }

    async fn move_path(&self, src: &str, dest: &str) -> io::Result<()> {
        self.move_sync(src, dest)
    }

    async fn copy(&self, src: &str, dest: &str) -> io::Result<()> {
        self.copy_sync(src, dest)
    }

    async fn file_exists(&self, path: &str) -> bool {
        self.file_exists_sync(path)
    }

    async fn directory_exists(&self, path: &str) -> bool {
        self.directory_exists_sync(path)
    }

    async fn glob(&self, patterns: &[String]) -> io::Result<Vec<String>> {
        self.glob_sync(patterns)
    }
}

pub(crate) fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("No such file or directory: {path}"))
}
