//! Staged file system transactions.
//!
//! [`TransactionalFileSystem`] sits in front of a [`FileSystemHost`] and lets
//! callers queue deletes, mkdirs, moves and copies, look at the file system as
//! it *would* be once the queue is applied, and then apply all of it, or just
//! one subtree.
//!
//! ## Execution Guarantees
//!
//! - **Ordering**: queued operations run in the order they were queued, across
//!   all directories (one global index)
//! - **Visibility**: existence checks and reads see queued deletes immediately
//! - **Safety**: immediate operations refuse to run while a queued operation
//!   from outside would move or delete the ground under them
//! - **Retry**: a failed batch puts the failing operation and everything after
//!   it back in the queue
//!
//! ## Phases
//!
//! 1. **Queue**: `queue_*()` records intent; nothing touches the host
//! 2. **Inspect**: `file_exists_sync()`, `read_dir_sync()` and friends answer
//!    with queued work applied
//! 3. **Apply**: `flush()` runs everything; `save_for_directory()` runs one
//!    subtree plus the ancestor mkdirs it depends on
//!
//! Every host-touching method has a blocking `*_sync` twin. Both share the same
//! bookkeeping and differ only in how the host is called.
//!
//! ## Example
//!
//! ```
//! # use stagefs::fs::TransactionalFileSystem;
//! # use stagefs::host::{FileSystemHost, InMemoryFileSystemHost};
//! # fn example() -> stagefs::Result<()> {
//! let mut fs = TransactionalFileSystem::new(InMemoryFileSystemHost::new());
//!
//! fs.write_file_sync("/project/old.txt", "text")?;
//! fs.queue_file_delete("/project/old.txt");
//!
//! assert!(!fs.file_exists_sync("/project/old.txt")); // overlay view
//! assert!(fs.host().file_exists_sync("/project/old.txt")); // not applied yet
//!
//! fs.flush_sync()?;
//! assert!(!fs.host().file_exists_sync("/project/old.txt"));
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

use super::casing::PathCasingMaintainer;
use super::directory::{Directory, DirectoryTree};
use super::operation::{Operation, OperationKind};
use crate::error::{Result, TransactionError};
use crate::host::{DirEntry, FileSystemHost};
use crate::path::{StandardizedPath, standardize};
use std::collections::{BTreeMap, HashSet};
use std::io;

/// What a missing path is reported as.
#[derive(Debug, Clone, Copy)]
enum Expected {
    File,
    Directory,
    Any,
}

/// Maps host "not found" to the matching error variant.
fn translate(err: io::Error, expected: Expected, path: &StandardizedPath) -> TransactionError {
    if err.kind() != io::ErrorKind::NotFound {
        return TransactionError::Io(err);
    }
    match expected {
        Expected::File => TransactionError::FileNotFound(path.to_string()),
        Expected::Directory => TransactionError::DirectoryNotFound(path.to_string()),
        Expected::Any => TransactionError::PathNotFound(path.to_string()),
    }
}

fn suppress_not_found(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn conflict_error(dir: &StandardizedPath, action: &str, conflicts: Vec<Operation>) -> TransactionError {
    let mut message = format!(
        "Cannot execute immediate operation '{action}' on {dir} because of the following external operations:"
    );
    for op in &conflicts {
        message.push_str(&format!("\n* {op}"));
    }
    TransactionError::InvalidOperation { message, conflicts }
}

fn log_applied(operation: &Operation) {
    match &operation.kind {
        OperationKind::DeleteFile(path) | OperationKind::DeleteDir(path) => {
            log::info!("Deleted: {}", path)
        }
        OperationKind::Mkdir(path) => log::info!("Created: {}", path),
        OperationKind::MoveDir { from, to } => log::info!("Moved: {} → {}", from, to),
        OperationKind::CopyDir { from, to } => log::info!("Copied: {} → {}", from, to),
    }
}

fn execute_sync<H: FileSystemHost>(host: &H, operation: &Operation) -> Result<()> {
    match &operation.kind {
        OperationKind::DeleteFile(path) | OperationKind::DeleteDir(path) => {
            suppress_not_found(host.delete_sync(path.as_str()))?
        }
        OperationKind::Mkdir(path) => host.mkdir_sync(path.as_str())?,
        OperationKind::MoveDir { from, to } => host
            .move_sync(from.as_str(), to.as_str())
            .map_err(|e| translate(e, Expected::Directory, from))?,
        OperationKind::CopyDir { from, to } => host
            .copy_sync(from.as_str(), to.as_str())
            .map_err(|e| translate(e, Expected::Directory, from))?,
    }
    log_applied(operation);
    Ok(())
}

async fn execute<H: FileSystemHost>(host: &H, operation: &Operation) -> Result<()> {
    match &operation.kind {
        OperationKind::DeleteFile(path) | OperationKind::DeleteDir(path) => {
            suppress_not_found(host.delete(path.as_str()).await)?
        }
        OperationKind::Mkdir(path) => host.mkdir(path.as_str()).await?,
        OperationKind::MoveDir { from, to } => host
            .move_path(from.as_str(), to.as_str())
            .await
            .map_err(|e| translate(e, Expected::Directory, from))?,
        OperationKind::CopyDir { from, to } => host
            .copy(from.as_str(), to.as_str())
            .await
            .map_err(|e| translate(e, Expected::Directory, from))?,
    }
    log_applied(operation);
    Ok(())
}

/// Statistics about queued operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionStats {
    pub file_deletes: usize,
    pub dir_deletes: usize,
    pub mkdirs: usize,
    pub moves: usize,
    pub copies: usize,
    pub total: usize,
}

/// Overlay that queues file system mutations against a [`FileSystemHost`].
///
/// Paths may be relative (resolved against the host's current directory) and
/// are standardized before use; on case-insensitive hosts, differently cased
/// spellings of one path share state.
pub struct TransactionalFileSystem<H: FileSystemHost> {
    host: H,
    directories: DirectoryTree,
    casing: PathCasingMaintainer,
    next_operation_index: u64,
    current_dir: StandardizedPath,
}

impl<H: FileSystemHost> TransactionalFileSystem<H> {
    pub fn new(host: H) -> Self {
        let current_dir = StandardizedPath::new(&host.current_directory());
        let casing = PathCasingMaintainer::new(host.is_case_sensitive());

        Self {
            host,
            directories: DirectoryTree::new(),
            casing,
            next_operation_index: 0,
            current_dir,
        }
    }

    /// The backing store. Reading it directly bypasses the overlay.
    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn current_directory(&self) -> &StandardizedPath {
        &self.current_dir
    }

    /// Absolute, normalized form of `path` in its canonical casing.
    pub fn get_standardized_absolute_path(&self, path: &str) -> StandardizedPath {
        self.casing.resolve(standardize(path, &self.current_dir))
    }

    /// Like [`Self::get_standardized_absolute_path`], but records the casing.
    fn track_path(&mut self, path: &str) -> StandardizedPath {
        self.casing.get_path(standardize(path, &self.current_dir))
    }

    fn next_index(&mut self) -> u64 {
        self.next_operation_index += 1;
        self.next_operation_index
    }

    /// Tracked directory state for `path`, if any.
    pub fn directory(&self, path: &str) -> Option<&Directory> {
        self.directories.get(&self.get_standardized_absolute_path(path))
    }

    /// All queued operations, in execution order.
    pub fn pending_operations(&self) -> Vec<Operation> {
        self.directories.all_operations()
    }

    pub fn len(&self) -> usize {
        self.pending_operations().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns human-readable preview of queued operations.
    pub fn preview(&self) -> Vec<String> {
        self.pending_operations()
            .iter()
            .map(|op| match &op.kind {
                OperationKind::DeleteFile(path) => format!("Delete file: {}", path),
                OperationKind::DeleteDir(path) => format!("Delete directory: {}", path),
                OperationKind::Mkdir(path) => format!("Create directory: {}", path),
                OperationKind::MoveDir { from, to } => format!("Move: {} → {}", from, to),
                OperationKind::CopyDir { from, to } => format!("Copy: {} → {}", from, to),
            })
            .collect()
    }

    /// Returns queued operation statistics.
    pub fn stats(&self) -> TransactionStats {
        let mut stats = TransactionStats::default();

        for op in self.pending_operations() {
            match op.kind {
                OperationKind::DeleteFile(_) => stats.file_deletes += 1,
                OperationKind::DeleteDir(_) => stats.dir_deletes += 1,
                OperationKind::Mkdir(_) => stats.mkdirs += 1,
                OperationKind::MoveDir { .. } => stats.moves += 1,
                OperationKind::CopyDir { .. } => stats.copies += 1,
            }
            stats.total += 1;
        }

        stats
    }
}

// Queueing
impl<H: FileSystemHost> TransactionalFileSystem<H> {
    /// The path keeps its case-folding entry until the delete runs.
    pub fn queue_file_delete(&mut self, path: &str) {
        let file = self.track_path(path);
        let index = self.next_index();
        self.enqueue(Operation::new(index, OperationKind::DeleteFile(file)));
    }

    /// Withdraws a queued delete of `path`, if there is one.
    pub fn remove_file_delete(&mut self, path: &str) {
        let file = self.track_path(path);
        let dir = file.parent().unwrap_or_else(|| file.clone());
        if let Some(node) = self.directories.get_mut(&dir) {
            if node.dequeue_file_delete(&file) {
                log::debug!("Dequeued delete of {}", file);
            }
        }
    }

    pub fn queue_directory_delete(&mut self, path: &str) -> Result<()> {
        let dir = self.track_path(path);
        if dir.is_root() {
            return Err(TransactionError::invalid(format!(
                "Cannot delete the root directory: {dir}"
            )));
        }

        let index = self.next_index();
        self.enqueue(Operation::new(index, OperationKind::DeleteDir(dir)));
        Ok(())
    }

    pub fn queue_mkdir(&mut self, path: &str) {
        let dir = self.track_path(path);
        let index = self.next_index();
        self.enqueue(Operation::new(index, OperationKind::Mkdir(dir)));
    }

    /// Queues a directory move. The source subtree reads as deleted from now on.
    pub fn queue_move_directory(&mut self, src: &str, dest: &str) -> Result<()> {
        let from = self.track_path(src);
        let to = self.track_path(dest);
        Self::check_transfer(&from, &to, "move")?;

        let index = self.next_index();
        self.enqueue(Operation::new(index, OperationKind::MoveDir { from, to }));
        Ok(())
    }

    pub fn queue_copy_directory(&mut self, src: &str, dest: &str) -> Result<()> {
        let from = self.track_path(src);
        let to = self.track_path(dest);
        Self::check_transfer(&from, &to, "copy")?;

        let index = self.next_index();
        self.enqueue(Operation::new(index, OperationKind::CopyDir { from, to }));
        Ok(())
    }

    fn check_transfer(from: &StandardizedPath, to: &StandardizedPath, verb: &str) -> Result<()> {
        if to.is_descendant_or_equal_of(from) {
            return Err(TransactionError::invalid(format!(
                "Cannot {verb} directory {from} into itself ({to})"
            )));
        }
        Ok(())
    }

    /// Records `operation` with its existing index and updates deletion state.
    ///
    /// Shared by the `queue_*` methods and by re-queueing after a failure.
    fn enqueue(&mut self, operation: Operation) {
        log::debug!("Queued #{} {}", operation.index, operation);

        match &operation.kind {
            OperationKind::DeleteFile(_) => {}
            OperationKind::DeleteDir(path) => {
                self.directories.get_or_create(path);
                self.directories.set_is_deleted(path, true);
            }
            OperationKind::Mkdir(path) => {
                self.directories.get_or_create(path);
                self.directories.set_is_deleted(path, false);
            }
            OperationKind::MoveDir { from, to } => {
                self.directories.get_or_create(to);
                self.directories.set_is_deleted(to, false);
                self.directories.get_or_create(from);
                self.directories.set_is_deleted(from, true);
            }
            OperationKind::CopyDir { from, to } => {
                self.directories.get_or_create(from);
                self.directories.get_or_create(to);
                self.directories.set_is_deleted(to, false);
            }
        }

        if let Some((_, to)) = operation.move_or_copy_paths() {
            let landing = to.parent().unwrap_or_else(|| to.clone());
            self.directories
                .get_or_create(&landing)
                .push_inbound_operation(operation.clone());
        }

        let owner = operation
            .subject()
            .parent()
            .unwrap_or_else(|| operation.subject().clone());
        self.directories
            .get_or_create(&owner)
            .push_operation(operation);
    }

    fn requeue(&mut self, operations: impl IntoIterator<Item = Operation>) {
        for operation in operations {
            self.enqueue(operation);
        }
    }
}

// Overlay queries
impl<H: FileSystemHost> TransactionalFileSystem<H> {
    /// True if `path` (a file or directory) or a containing directory is
    /// queued for deletion or has been moved away.
    pub fn is_path_queued_for_deletion(&self, path: &str) -> bool {
        self.queued_for_deletion(&self.get_standardized_absolute_path(path))
    }

    /// True if `path` or any ancestor has ever been deleted or moved away
    /// since the last flush.
    pub fn was_ever_deleted(&self, path: &str) -> bool {
        self.directories
            .was_ever_deleted(&self.get_standardized_absolute_path(path))
    }

    fn queued_for_deletion(&self, path: &StandardizedPath) -> bool {
        if let Some(dir) = self.directories.get(path) {
            return dir.is_deleted();
        }

        let file_delete_queued = path
            .parent()
            .and_then(|parent| self.directories.get(&parent))
            .is_some_and(|parent| parent.is_file_queued_for_delete(path));

        file_delete_queued || self.directories.is_within_deleted(path)
    }

    /// A file is hidden once it, or a directory containing it, was deleted.
    fn file_hidden(&self, file: &StandardizedPath) -> bool {
        self.queued_for_deletion(file)
            || file
                .parent()
                .is_some_and(|dir| self.directories.was_ever_deleted(&dir))
    }

    /// Existence of a directory as decided by the queue alone.
    fn overlay_directory_state(&self, dir: &StandardizedPath) -> Option<bool> {
        if self.queued_for_deletion(dir) {
            return Some(false);
        }
        if self.directories.is_queued_to_exist(dir) {
            return Some(true);
        }
        if self.directories.was_ever_deleted(dir) {
            return Some(false);
        }
        None
    }

    fn throw_if_file_hidden(&self, file: &StandardizedPath) -> Result<()> {
        if self.file_hidden(file) {
            return Err(TransactionError::invalid(format!(
                "Cannot read file that was deleted or lies in a deleted directory: {file}"
            )));
        }
        Ok(())
    }

    fn throw_if_directory_deleted(&self, dir: &StandardizedPath) -> Result<()> {
        if self.queued_for_deletion(dir) || self.directories.was_ever_deleted(dir) {
            return Err(TransactionError::invalid(format!(
                "Cannot read directory that was deleted: {dir}"
            )));
        }
        Ok(())
    }

    /// Fails with every queued operation that reaches into `dir` from outside.
    fn throw_if_has_external_operations(&self, dir: &StandardizedPath, action: &str) -> Result<()> {
        let conflicts = self.directories.external_operations(dir);
        if conflicts.is_empty() {
            return Ok(());
        }
        Err(conflict_error(dir, action, conflicts))
    }

    pub fn file_exists_sync(&self, path: &str) -> bool {
        let file = self.get_standardized_absolute_path(path);
        !self.file_hidden(&file) && self.host.file_exists_sync(file.as_str())
    }

    pub async fn file_exists(&self, path: &str) -> bool {
        let file = self.get_standardized_absolute_path(path);
        !self.file_hidden(&file) && self.host.file_exists(file.as_str()).await
    }

    pub fn directory_exists_sync(&self, path: &str) -> bool {
        let dir = self.get_standardized_absolute_path(path);
        match self.overlay_directory_state(&dir) {
            Some(exists) => exists,
            None => self.host.directory_exists_sync(dir.as_str()),
        }
    }

    pub async fn directory_exists(&self, path: &str) -> bool {
        let dir = self.get_standardized_absolute_path(path);
        match self.overlay_directory_state(&dir) {
            Some(exists) => exists,
            None => self.host.directory_exists(dir.as_str()).await,
        }
    }

    /// Reads a file.
    ///
    /// # Errors
    ///
    /// - `InvalidOperation` if the file or a containing directory was deleted
    /// - `FileNotFound` if the host has no such file
    pub fn read_file_sync(&self, path: &str) -> Result<String> {
        let file = self.get_standardized_absolute_path(path);
        self.throw_if_file_hidden(&file)?;
        self.host
            .read_file_sync(file.as_str())
            .map_err(|e| translate(e, Expected::File, &file))
    }

    pub async fn read_file(&self, path: &str) -> Result<String> {
        let file = self.get_standardized_absolute_path(path);
        self.throw_if_file_hidden(&file)?;
        self.host
            .read_file(file.as_str())
            .await
            .map_err(|e| translate(e, Expected::File, &file))
    }

    /// Reads a file, treating deleted and missing files alike as `None`.
    pub fn read_file_if_exists_sync(&self, path: &str) -> Result<Option<String>> {
        let file = self.get_standardized_absolute_path(path);
        if self.file_hidden(&file) {
            return Ok(None);
        }
        match self.host.read_file_sync(file.as_str()) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn read_file_if_exists(&self, path: &str) -> Result<Option<String>> {
        let file = self.get_standardized_absolute_path(path);
        if self.file_hidden(&file) {
            return Ok(None);
        }
        match self.host.read_file(file.as_str()).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Lists a directory as it would look once the queue is applied.
    ///
    /// Host entries that are queued for deletion are dropped, and directories
    /// that only exist in the queue are added.
    pub fn read_dir_sync(&self, path: &str) -> Result<Vec<DirEntry>> {
        let dir = self.get_standardized_absolute_path(path);
        self.throw_if_directory_deleted(&dir)?;

        let entries = if self.host.directory_exists_sync(dir.as_str()) {
            self.host
                .read_dir_sync(dir.as_str())
                .map_err(|e| translate(e, Expected::Directory, &dir))?
        } else if self.directories.is_queued_to_exist(&dir) {
            Vec::new()
        } else {
            return Err(TransactionError::DirectoryNotFound(dir.to_string()));
        };

        Ok(self.merge_overlay_entries(&dir, entries))
    }

    /// Child directories of `path`, overlay applied.
    pub fn get_directories(&self, path: &str) -> Result<Vec<StandardizedPath>> {
        Ok(self
            .read_dir_sync(path)?
            .into_iter()
            .filter(|entry| entry.is_directory)
            .map(|entry| StandardizedPath::new(&entry.path))
            .collect())
    }

    fn merge_overlay_entries(&self, dir: &StandardizedPath, entries: Vec<DirEntry>) -> Vec<DirEntry> {
        let mut merged: BTreeMap<StandardizedPath, DirEntry> = BTreeMap::new();

        for entry in entries {
            let path = self.get_standardized_absolute_path(&entry.path);
            let visible = if entry.is_directory {
                self.overlay_directory_state(&path).unwrap_or(true)
            } else {
                !self.file_hidden(&path)
            };

            if visible {
                let entry = DirEntry {
                    path: path.to_string(),
                    ..entry
                };
                merged.insert(path, entry);
            }
        }

        if let Some(node) = self.directories.get(dir) {
            for child in node.children() {
                if !merged.contains_key(child) && self.directories.is_queued_to_exist(child) {
                    merged.insert(child.clone(), DirEntry::directory(child.as_str()));
                }
            }
        }

        merged.into_values().collect()
    }

    /// Files matching `patterns`, minus those queued for deletion.
    pub fn glob_sync(&self, patterns: &[String]) -> Result<Vec<StandardizedPath>> {
        let matches = self.host.glob_sync(patterns)?;
        Ok(self.visible_files(matches))
    }

    pub async fn glob(&self, patterns: &[String]) -> Result<Vec<StandardizedPath>> {
        let matches = self.host.glob(patterns).await?;
        Ok(self.visible_files(matches))
    }

    fn visible_files(&self, paths: Vec<String>) -> Vec<StandardizedPath> {
        paths
            .iter()
            .map(|path| self.get_standardized_absolute_path(path))
            .filter(|path| !self.file_hidden(path))
            .collect()
    }

    pub fn realpath_sync(&self, path: &str) -> Result<StandardizedPath> {
        let resolved = self.get_standardized_absolute_path(path);
        let real = self
            .host
            .realpath_sync(resolved.as_str())
            .map_err(|e| translate(e, Expected::Any, &resolved))?;
        Ok(self.get_standardized_absolute_path(&real))
    }
}

// Applying queued work
impl<H: FileSystemHost> TransactionalFileSystem<H> {
    /// Removes every queued operation from the index, in execution order.
    fn take_all_operations(&mut self) -> Vec<Operation> {
        let operations = self.directories.all_operations();
        self.directories.clear();
        log::debug!("Collected {} queued operation(s) for flush", operations.len());
        operations
    }

    /// Removes the operations that realize `dir`: everything queued in its
    /// subtree plus the ancestor mkdirs it needs.
    fn take_operations_for_directory(
        &mut self,
        dir: &StandardizedPath,
        action: &str,
    ) -> Result<Vec<Operation>> {
        self.throw_if_has_external_operations(dir, action)?;

        let mut operations = self.directories.take_ancestor_mkdirs(dir);
        operations.extend(self.directories.remove_dir_and_subdirs(dir));
        operations.sort_by_key(|op| op.index);

        let indices: HashSet<u64> = operations.iter().map(|op| op.index).collect();
        self.directories.remove_inbound_operations(&indices);

        log::debug!("Collected {} queued operation(s) under {}", operations.len(), dir);
        Ok(operations)
    }

    /// Puts back `failed` and everything after it, then hands the error on.
    fn requeue_remaining(
        &mut self,
        failed: Operation,
        rest: impl Iterator<Item = Operation>,
        err: TransactionError,
    ) -> TransactionError {
        let remaining: Vec<Operation> = std::iter::once(failed).chain(rest).collect();
        log::warn!(
            "{} failed; re-queued {} operation(s): {}",
            remaining[0],
            remaining.len(),
            err
        );
        self.requeue(remaining);
        err
    }

    /// Paths that no longer exist once `operation` ran may come back with
    /// a different spelling.
    fn forget_casing(&mut self, operation: &Operation) {
        match &operation.kind {
            OperationKind::DeleteFile(path)
            | OperationKind::DeleteDir(path)
            | OperationKind::MoveDir { from: path, .. } => self.casing.remove_path(path),
            OperationKind::Mkdir(_) | OperationKind::CopyDir { .. } => {}
        }
    }

    fn run_batch_sync(&mut self, operations: Vec<Operation>) -> Result<()> {
        let mut pending = operations.into_iter();
        while let Some(operation) = pending.next() {
            if let Err(e) = execute_sync(&self.host, &operation) {
                return Err(self.requeue_remaining(operation, pending, e));
            }
            self.forget_casing(&operation);
        }
        Ok(())
    }

    async fn run_batch(&mut self, operations: Vec<Operation>) -> Result<()> {
        let mut pending = operations.into_iter();
        while let Some(operation) = pending.next() {
            if let Err(e) = execute(&self.host, &operation).await {
                return Err(self.requeue_remaining(operation, pending, e));
            }
            self.forget_casing(&operation);
        }
        Ok(())
    }

    /// Drops every queued operation without applying it.
    pub fn discard(&mut self) -> Vec<Operation> {
        let operations = self.directories.all_operations();
        self.directories.clear();
        log::debug!("Discarded {} queued operation(s)", operations.len());
        operations
    }

    /// Applies every queued operation in queue order and clears the index.
    pub fn flush_sync(&mut self) -> Result<()> {
        let operations = self.take_all_operations();
        self.run_batch_sync(operations)
    }

    pub async fn flush(&mut self) -> Result<()> {
        let operations = self.take_all_operations();
        self.run_batch(operations).await
    }

    fn ensure_directory_exists_sync(&mut self, dir: &StandardizedPath) -> Result<()> {
        if dir.is_root() {
            return Ok(());
        }
        let consumed = self.directories.take_ancestor_mkdirs(dir);
        if let Err(e) = self.host.mkdir_sync(dir.as_str()) {
            self.requeue(consumed);
            return Err(e.into());
        }
        Ok(())
    }

    async fn ensure_directory_exists(&mut self, dir: &StandardizedPath) -> Result<()> {
        if dir.is_root() {
            return Ok(());
        }
        let consumed = self.directories.take_ancestor_mkdirs(dir);
        if let Err(e) = self.host.mkdir(dir.as_str()).await {
            self.requeue(consumed);
            return Err(e.into());
        }
        Ok(())
    }

    fn save_scope_sync(&mut self, dir: &StandardizedPath, action: &str, create: bool) -> Result<()> {
        let operations = self.take_operations_for_directory(dir, action)?;
        if create {
            if let Err(e) = self.ensure_directory_exists_sync(dir) {
                self.requeue(operations);
                return Err(e);
            }
        }
        self.run_batch_sync(operations)
    }

    async fn save_scope(&mut self, dir: &StandardizedPath, action: &str, create: bool) -> Result<()> {
        let operations = self.take_operations_for_directory(dir, action)?;
        if create {
            if let Err(e) = self.ensure_directory_exists(dir).await {
                self.requeue(operations);
                return Err(e);
            }
        }
        self.run_batch(operations).await
    }

    /// Applies the queued work for one subtree, leaving unrelated work queued.
    ///
    /// Also runs (and removes) pending mkdirs of the directory's ancestors,
    /// and creates the directory itself.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if a queued operation outside the subtree moves,
    /// copies or deletes it, or if a move/copy inside it reaches outside.
    pub fn save_for_directory_sync(&mut self, path: &str) -> Result<()> {
        let dir = self.track_path(path);
        self.save_scope_sync(&dir, "save directory", true)
    }

    pub async fn save_for_directory(&mut self, path: &str) -> Result<()> {
        let dir = self.track_path(path);
        self.save_scope(&dir, "save directory", true).await
    }
}

// Immediate operations
impl<H: FileSystemHost> TransactionalFileSystem<H> {
    /// Writes a file now, creating its directory.
    ///
    /// Withdraws a queued delete of the same file and consumes queued mkdirs
    /// of the containing directories.
    pub fn write_file_sync(&mut self, path: &str, text: &str) -> Result<()> {
        let (file, dir) = self.prepare_write(path)?;
        self.ensure_directory_exists_sync(&dir)?;
        self.host
            .write_file_sync(file.as_str(), text)
            .map_err(|e| translate(e, Expected::Directory, &dir))
    }

    pub async fn write_file(&mut self, path: &str, text: &str) -> Result<()> {
        let (file, dir) = self.prepare_write(path)?;
        self.ensure_directory_exists(&dir).await?;
        self.host
            .write_file(file.as_str(), text)
            .await
            .map_err(|e| translate(e, Expected::Directory, &dir))
    }

    fn prepare_write(&mut self, path: &str) -> Result<(StandardizedPath, StandardizedPath)> {
        let file = self.track_path(path);
        let dir = file.parent().unwrap_or_else(|| file.clone());

        self.throw_if_has_external_operations(&dir, "write file")?;
        self.directories.get_or_create(&dir).dequeue_file_delete(&file);

        Ok((file, dir))
    }

    /// Writes `text` to `new_path`, then deletes `old_path`.
    pub fn move_file_immediately_sync(&mut self, old_path: &str, new_path: &str, text: &str) -> Result<()> {
        self.prepare_file_move(old_path, new_path)?;
        self.write_file_sync(new_path, text)?;
        self.delete_file_immediately_sync(old_path)
    }

    pub async fn move_file_immediately(&mut self, old_path: &str, new_path: &str, text: &str) -> Result<()> {
        self.prepare_file_move(old_path, new_path)?;
        self.write_file(new_path, text).await?;
        self.delete_file_immediately(old_path).await
    }

    fn prepare_file_move(&mut self, old_path: &str, new_path: &str) -> Result<()> {
        for path in [old_path, new_path] {
            let file = self.track_path(path);
            let dir = file.parent().unwrap_or_else(|| file.clone());
            self.throw_if_has_external_operations(&dir, "move file")?;
        }
        Ok(())
    }

    /// Deletes a file now. A missing file is not an error.
    ///
    /// If the host fails, the delete is queued instead and the error returned.
    pub fn delete_file_immediately_sync(&mut self, path: &str) -> Result<()> {
        let file = self.prepare_file_delete(path)?;
        match suppress_not_found(self.host.delete_sync(file.as_str())) {
            Ok(()) => {
                log::info!("Deleted: {}", file);
                Ok(())
            }
            Err(e) => Err(self.fall_back_to_queued_file_delete(&file, e)),
        }
    }

    pub async fn delete_file_immediately(&mut self, path: &str) -> Result<()> {
        let file = self.prepare_file_delete(path)?;
        match suppress_not_found(self.host.delete(file.as_str()).await) {
            Ok(()) => {
                log::info!("Deleted: {}", file);
                Ok(())
            }
            Err(e) => Err(self.fall_back_to_queued_file_delete(&file, e)),
        }
    }

    fn prepare_file_delete(&mut self, path: &str) -> Result<StandardizedPath> {
        let file = self.track_path(path);
        let dir = file.parent().unwrap_or_else(|| file.clone());

        self.throw_if_has_external_operations(&dir, "delete file")?;
        self.directories.get_or_create(&dir).dequeue_file_delete(&file);
        self.casing.remove_path(&file);

        Ok(file)
    }

    fn fall_back_to_queued_file_delete(&mut self, file: &StandardizedPath, err: io::Error) -> TransactionError {
        log::warn!("Immediate delete of {} failed, queued instead: {}", file, err);
        self.queue_file_delete(file.as_str());
        translate(err, Expected::File, file)
    }

    /// Deletes a directory now, discarding queued work inside it.
    ///
    /// A queued delete of the directory itself is superseded. If the host
    /// fails, the discarded work and a directory delete are queued instead and
    /// the error returned.
    pub fn delete_directory_immediately_sync(&mut self, path: &str) -> Result<()> {
        let (dir, discarded) = self.prepare_directory_delete(path, "delete directory")?;
        match suppress_not_found(self.host.delete_sync(dir.as_str())) {
            Ok(()) => {
                log::info!("Deleted: {}", dir);
                Ok(())
            }
            Err(e) => Err(self.fall_back_to_queued_directory_delete(&dir, discarded, e)),
        }
    }

    pub async fn delete_directory_immediately(&mut self, path: &str) -> Result<()> {
        let (dir, discarded) = self.prepare_directory_delete(path, "delete directory")?;
        match suppress_not_found(self.host.delete(dir.as_str()).await) {
            Ok(()) => {
                log::info!("Deleted: {}", dir);
                Ok(())
            }
            Err(e) => Err(self.fall_back_to_queued_directory_delete(&dir, discarded, e)),
        }
    }

    fn prepare_directory_delete(
        &mut self,
        path: &str,
        action: &str,
    ) -> Result<(StandardizedPath, Vec<Operation>)> {
        let dir = self.track_path(path);
        if dir.is_root() {
            return Err(TransactionError::invalid(format!(
                "Cannot delete the root directory: {dir}"
            )));
        }

        let conflicts: Vec<Operation> = self
            .directories
            .external_operations(&dir)
            .into_iter()
            .filter(|op| !op.is_dir_delete_of(&dir))
            .collect();
        if !conflicts.is_empty() {
            return Err(conflict_error(&dir, action, conflicts));
        }

        let mut discarded = Vec::new();
        if let Some(parent) = dir.parent() {
            if let Some(node) = self.directories.get_mut(&parent) {
                if node.dequeue_dir_delete(&dir) {
                    log::debug!("Superseded queued delete of {}", dir);
                }
                discarded.extend(node.remove_matching_operations(|op| op.is_mkdir_of(&dir)));
            }
        }
        discarded.extend(self.directories.remove_dir_and_subdirs(&dir));
        discarded.sort_by_key(|op| op.index);

        let indices: HashSet<u64> = discarded.iter().map(|op| op.index).collect();
        self.directories.remove_inbound_operations(&indices);
        self.casing.remove_path(&dir);

        if !discarded.is_empty() {
            log::debug!("Discarded {} queued operation(s) under {}", discarded.len(), dir);
        }
        Ok((dir, discarded))
    }

    fn fall_back_to_queued_directory_delete(
        &mut self,
        dir: &StandardizedPath,
        discarded: Vec<Operation>,
        err: io::Error,
    ) -> TransactionError {
        log::warn!("Immediate delete of {} failed, queued instead: {}", dir, err);
        self.requeue(discarded);
        let index = self.next_index();
        self.enqueue(Operation::new(index, OperationKind::DeleteDir(dir.clone())));
        translate(err, Expected::Directory, dir)
    }

    /// Empties a directory now: deletes it and creates it again.
    pub fn clear_directory_immediately_sync(&mut self, path: &str) -> Result<()> {
        let (dir, discarded) = self.prepare_directory_delete(path, "clear directory")?;
        if let Err(e) = suppress_not_found(self.host.delete_sync(dir.as_str())) {
            return Err(self.fall_back_to_queued_directory_delete(&dir, discarded, e));
        }
        self.directories.get_or_create(&dir);
        let created = self.host.mkdir_sync(dir.as_str());
        created.map_err(|e| self.fall_back_to_queued_mkdir(&dir, e))
    }

    pub async fn clear_directory_immediately(&mut self, path: &str) -> Result<()> {
        let (dir, discarded) = self.prepare_directory_delete(path, "clear directory")?;
        if let Err(e) = suppress_not_found(self.host.delete(dir.as_str()).await) {
            return Err(self.fall_back_to_queued_directory_delete(&dir, discarded, e));
        }
        self.directories.get_or_create(&dir);
        let created = self.host.mkdir(dir.as_str()).await;
        created.map_err(|e| self.fall_back_to_queued_mkdir(&dir, e))
    }

    fn fall_back_to_queued_mkdir(&mut self, dir: &StandardizedPath, err: io::Error) -> TransactionError {
        log::warn!("Re-creating {} failed, queued instead: {}", dir, err);
        self.queue_mkdir(dir.as_str());
        TransactionError::Io(err)
    }

    /// Copies a directory now.
    ///
    /// Queued work scoped to the source or destination is applied first.
    pub fn copy_directory_immediately_sync(&mut self, src: &str, dest: &str) -> Result<()> {
        let (from, to) = self.prepare_transfer(src, dest, "copy")?;
        self.save_scope_sync(&from, "copy directory", false)?;
        self.save_scope_sync(&to, "copy directory", false)?;

        self.host
            .copy_sync(from.as_str(), to.as_str())
            .map_err(|e| translate(e, Expected::Directory, &from))?;
        log::info!("Copied: {} → {}", from, to);
        Ok(())
    }

    pub async fn copy_directory_immediately(&mut self, src: &str, dest: &str) -> Result<()> {
        let (from, to) = self.prepare_transfer(src, dest, "copy")?;
        self.save_scope(&from, "copy directory", false).await?;
        self.save_scope(&to, "copy directory", false).await?;

        self.host
            .copy(from.as_str(), to.as_str())
            .await
            .map_err(|e| translate(e, Expected::Directory, &from))?;
        log::info!("Copied: {} → {}", from, to);
        Ok(())
    }

    /// Moves a directory now.
    ///
    /// Queued work scoped to the source or destination is applied first.
    pub fn move_directory_immediately_sync(&mut self, src: &str, dest: &str) -> Result<()> {
        let (from, to) = self.prepare_transfer(src, dest, "move")?;
        self.save_scope_sync(&from, "move directory", false)?;
        self.save_scope_sync(&to, "move directory", false)?;
        self.casing.remove_path(&from);

        self.host
            .move_sync(from.as_str(), to.as_str())
            .map_err(|e| translate(e, Expected::Directory, &from))?;
        log::info!("Moved: {} → {}", from, to);
        Ok(())
    }

    pub async fn move_directory_immediately(&mut self, src: &str, dest: &str) -> Result<()> {
        let (from, to) = self.prepare_transfer(src, dest, "move")?;
        self.save_scope(&from, "move directory", false).await?;
        self.save_scope(&to, "move directory", false).await?;
        self.casing.remove_path(&from);

        self.host
            .move_path(from.as_str(), to.as_str())
            .await
            .map_err(|e| translate(e, Expected::Directory, &from))?;
        log::info!("Moved: {} → {}", from, to);
        Ok(())
    }

    fn prepare_transfer(
        &mut self,
        src: &str,
        dest: &str,
        verb: &str,
    ) -> Result<(StandardizedPath, StandardizedPath)> {
        let from = self.track_path(src);
        let to = self.track_path(dest);
        Self::check_transfer(&from, &to, verb)?;

        let action = format!("{verb} directory");
        self.throw_if_has_external_operations(&from, &action)?;
        self.throw_if_has_external_operations(&to, &action)?;

        Ok((from, to))
    }
}

impl<H: FileSystemHost> Drop for TransactionalFileSystem<H> {
    fn drop(&mut self) {
        let pending = self.directories.all_operations().len();
        if pending > 0 {
            log::warn!("Transactional file system dropped with {} queued operation(s)", pending);
        }
    }
}
