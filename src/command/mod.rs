pub mod apply;
pub mod list;
pub mod plan;

use crate::error::{Result, TransactionError};
use crate::host::RealFileSystemHost;
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum Command {
    /// Stage a plan and apply it (or part of it) to disk.
    Apply(apply::ApplyArgs),
    /// Stage a plan and list a directory as it would look afterwards.
    Ls(list::ListArgs),
}

/// Host resolving relative paths against `root`, or the working directory.
pub(crate) fn open_host(root: Option<&Path>) -> Result<RealFileSystemHost> {
    match root {
        Some(root) => {
            let root = root
                .canonicalize()
                .map_err(|_| TransactionError::DirectoryNotFound(root.display().to_string()))?;
            if !root.is_dir() {
                return Err(TransactionError::DirectoryNotFound(root.display().to_string()));
            }
            Ok(RealFileSystemHost::with_current_directory(root))
        }
        None => Ok(RealFileSystemHost::new()?),
    }
}
