//! Directory records and the arena that links them.
//!
//! Every tracked path has one [`Directory`] in a [`DirectoryTree`], keyed by
//! its standardized path. Parent and child links are stored as keys into the
//! same table, so the tree never holds references into itself. Children are
//! kept in a sorted set for deterministic traversal.
//!
//! ## Where operations live
//!
//! - delete/mkdir of `p`: on the directory containing `p`
//! - move/copy `from → to`: on the directory containing `from`, with a copy in
//!   `inbound_operations` of the directory containing `to`

use super::operation::{Operation, OperationKind};
use crate::path::StandardizedPath;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Pending-operation state for one path.
#[derive(Debug)]
pub struct Directory {
    path: StandardizedPath,
    parent: Option<StandardizedPath>,
    children: BTreeSet<StandardizedPath>,
    operations: Vec<Operation>,
    inbound_operations: Vec<Operation>,
    is_deleted: bool,
    was_ever_deleted: bool,
}

impl Directory {
    fn new(path: StandardizedPath) -> Self {
        Self {
            path,
            parent: None,
            children: BTreeSet::new(),
            operations: Vec::new(),
            inbound_operations: Vec::new(),
            is_deleted: false,
            was_ever_deleted: false,
        }
    }

    pub fn path(&self) -> &StandardizedPath {
        &self.path
    }

    pub fn parent(&self) -> Option<&StandardizedPath> {
        self.parent.as_ref()
    }

    /// Tracked child directories, sorted by path.
    pub fn children(&self) -> impl Iterator<Item = &StandardizedPath> {
        self.children.iter()
    }

    /// Operations owned by this directory, in queue order.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Moves and copies whose destination lands directly in this directory.
    pub fn inbound_operations(&self) -> &[Operation] {
        &self.inbound_operations
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    pub fn is_root_dir(&self) -> bool {
        self.path.is_root()
    }

    pub fn has_operation(&self, predicate: impl Fn(&Operation) -> bool) -> bool {
        self.operations.iter().any(predicate)
    }

    pub fn is_file_queued_for_delete(&self, file: &StandardizedPath) -> bool {
        self.has_operation(|op| op.is_file_delete_of(file))
    }

    /// Removes and returns owned operations matching `predicate`.
    pub(crate) fn remove_matching_operations(
        &mut self,
        predicate: impl Fn(&Operation) -> bool,
    ) -> Vec<Operation> {
        let (removed, kept): (Vec<Operation>, Vec<Operation>) = std::mem::take(&mut self.operations)
            .into_iter()
            .partition(|op| predicate(op));
        self.operations = kept;
        removed
    }

    pub(crate) fn dequeue_file_delete(&mut self, file: &StandardizedPath) -> bool {
        !self
            .remove_matching_operations(|op| op.is_file_delete_of(file))
            .is_empty()
    }

    pub(crate) fn dequeue_dir_delete(&mut self, dir: &StandardizedPath) -> bool {
        !self
            .remove_matching_operations(|op| op.is_dir_delete_of(dir))
            .is_empty()
    }

    pub(crate) fn push_operation(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    pub(crate) fn push_inbound_operation(&mut self, operation: Operation) {
        self.inbound_operations.push(operation);
    }
}

/// Path → [`Directory`] index; the arena behind the overlay.
#[derive(Debug, Default)]
pub struct DirectoryTree {
    directories: HashMap<StandardizedPath, Directory>,
}

impl DirectoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.directories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directories.is_empty()
    }

    pub fn get(&self, path: &StandardizedPath) -> Option<&Directory> {
        self.directories.get(path)
    }

    pub(crate) fn get_mut(&mut self, path: &StandardizedPath) -> Option<&mut Directory> {
        self.directories.get_mut(path)
    }

    fn node(&self, path: &StandardizedPath) -> &Directory {
        self.directories
            .get(path)
            .unwrap_or_else(|| panic!("Directory index has no entry for linked path {path}"))
    }

    fn node_mut(&mut self, path: &StandardizedPath) -> &mut Directory {
        self.directories
            .get_mut(path)
            .unwrap_or_else(|| panic!("Directory index has no entry for linked path {path}"))
    }

    /// Returns the directory for `path`, creating it and any missing
    /// ancestors and linking each to its parent.
    pub(crate) fn get_or_create(&mut self, path: &StandardizedPath) -> &mut Directory {
        if !self.directories.contains_key(path) {
            log::debug!("Tracking directory: {}", path);
            self.directories
                .insert(path.clone(), Directory::new(path.clone()));

            if let Some(parent) = path.parent() {
                self.get_or_create(&parent);
                self.set_parent(path, &parent);
            }
        }
        self.node_mut(path)
    }

    /// Links `child` under `parent`.
    ///
    /// # Panics
    ///
    /// If `child` already has a parent. A directory is owned exactly once.
    pub(crate) fn set_parent(&mut self, child: &StandardizedPath, parent: &StandardizedPath) {
        let node = self.node_mut(child);
        assert!(
            node.parent.is_none(),
            "Parent was already set for directory {child}"
        );
        node.parent = Some(parent.clone());
        let child_deleted = node.is_deleted;

        let parent_node = self.node_mut(parent);
        parent_node.children.insert(child.clone());

        // A live child needs a live parent.
        if parent_node.is_deleted && !child_deleted {
            self.set_is_deleted(parent, false);
        }
    }

    pub(crate) fn remove_parent(&mut self, child: &StandardizedPath) {
        let Some(parent) = self.get_mut(child).and_then(|node| node.parent.take()) else {
            return;
        };
        if let Some(parent_node) = self.get_mut(&parent) {
            parent_node.children.remove(child);
        }
    }

    /// Marks `path` deleted (cascading to every tracked descendant) or live
    /// (reviving every deleted ancestor).
    pub(crate) fn set_is_deleted(&mut self, path: &StandardizedPath, value: bool) {
        let node = self.node_mut(path);
        if node.is_deleted == value {
            return;
        }
        node.is_deleted = value;

        if value {
            node.was_ever_deleted = true;
            let children: Vec<_> = node.children.iter().cloned().collect();
            for child in children {
                self.set_is_deleted(&child, true);
            }
        } else if let Some(parent) = node.parent.clone() {
            if self.node(&parent).is_deleted {
                self.set_is_deleted(&parent, false);
            }
        }
    }

    /// True if `path` or any tracked ancestor was ever deleted or moved away.
    ///
    /// Works for untracked paths too, by consulting their nearest tracked
    /// ancestors.
    pub fn was_ever_deleted(&self, path: &StandardizedPath) -> bool {
        std::iter::once(path.clone())
            .chain(path.ancestors())
            .filter_map(|p| self.directories.get(&p))
            .any(|node| node.was_ever_deleted)
    }

    /// Deletion state of the nearest tracked directory at or above `path`.
    pub fn is_within_deleted(&self, path: &StandardizedPath) -> bool {
        std::iter::once(path.clone())
            .chain(path.ancestors())
            .find_map(|p| self.directories.get(&p))
            .is_some_and(|node| node.is_deleted)
    }

    /// Tracked ancestors, nearest first.
    pub fn ancestors(&self, path: &StandardizedPath) -> Vec<StandardizedPath> {
        path.ancestors()
            .filter(|p| self.directories.contains_key(p))
            .collect()
    }

    /// Tracked descendants in depth-first, sorted order.
    pub fn descendants(&self, path: &StandardizedPath) -> Vec<StandardizedPath> {
        let mut found = Vec::new();
        let Some(node) = self.get(path) else {
            return found;
        };

        let mut stack: Vec<&StandardizedPath> = node.children.iter().rev().collect();
        while let Some(current) = stack.pop() {
            found.push(current.clone());
            stack.extend(self.node(current).children.iter().rev());
        }
        found
    }

    /// Queued operations that act on `path` from outside its subtree.
    ///
    /// Two sources:
    ///
    /// - **above**: a directory delete, move or copy owned by an ancestor
    ///   whose source or destination contains `path`
    /// - **below**: a move or copy owned by `path` or a descendant (or landing
    ///   there) whose source and destination are not both inside `path`
    ///
    /// Result is deduplicated and sorted by operation index.
    pub fn external_operations(&self, path: &StandardizedPath) -> Vec<Operation> {
        let mut found: BTreeMap<u64, Operation> = BTreeMap::new();

        for ancestor in self.ancestors(path) {
            let node = self.node(&ancestor);
            for op in node.operations.iter().chain(&node.inbound_operations) {
                if affects_from_above(path, op) {
                    found.entry(op.index).or_insert_with(|| op.clone());
                }
            }
        }

        let subtree = std::iter::once(path.clone()).chain(self.descendants(path));
        for dir in subtree {
            let Some(node) = self.get(&dir) else {
                continue;
            };
            for op in node.operations.iter().chain(&node.inbound_operations) {
                if let Some((from, to)) = op.move_or_copy_paths() {
                    let internal =
                        from.is_descendant_or_equal_of(path) && to.is_descendant_or_equal_of(path);
                    if !internal {
                        found.entry(op.index).or_insert_with(|| op.clone());
                    }
                }
            }
        }

        found.into_values().collect()
    }

    /// Whether `dir` will exist once the queue is applied, judging only by
    /// queued work: its own mkdir, an inbound move/copy, or a descendant that
    /// is queued to exist.
    pub fn is_queued_to_exist(&self, dir: &StandardizedPath) -> bool {
        let Some(node) = self.get(dir) else {
            return false;
        };
        if node.is_deleted {
            return false;
        }

        let created_here = dir.parent().and_then(|p| self.get(&p)).is_some_and(|parent| {
            parent.has_operation(|op| op.is_mkdir_of(dir))
                || parent
                    .inbound_operations
                    .iter()
                    .any(|op| matches!(op.move_or_copy_paths(), Some((_, to)) if to == dir))
        });

        created_here || node.children.iter().any(|child| self.is_queued_to_exist(child))
    }

    /// Removes the queued `mkdir` for `dir` and for each of its ancestors.
    ///
    /// This mutates directories outside `dir`'s subtree: the mkdir for a
    /// directory is owned by its parent, so realizing `dir` on its own means
    /// taking those operations away from every ancestor.
    pub(crate) fn take_ancestor_mkdirs(&mut self, dir: &StandardizedPath) -> Vec<Operation> {
        let mut taken = Vec::new();
        let mut child = dir.clone();

        while let Some(parent) = child.parent() {
            if let Some(node) = self.get_mut(&parent) {
                taken.extend(node.remove_matching_operations(|op| op.is_mkdir_of(&child)));
            }
            child = parent;
        }

        if !taken.is_empty() {
            log::debug!("Consumed {} ancestor mkdir(s) for {}", taken.len(), dir);
        }
        taken
    }

    /// Drops `path` and its descendants from the index, returning the
    /// operations they owned.
    pub(crate) fn remove_dir_and_subdirs(&mut self, path: &StandardizedPath) -> Vec<Operation> {
        if !self.directories.contains_key(path) {
            return Vec::new();
        }

        let descendants = self.descendants(path);
        self.remove_parent(path);

        let mut removed = Vec::new();
        for dir in std::iter::once(path.clone()).chain(descendants) {
            if let Some(node) = self.directories.remove(&dir) {
                removed.extend(node.operations);
            }
        }
        removed
    }

    /// Forgets the inbound copies of the given operations.
    pub(crate) fn remove_inbound_operations(&mut self, indices: &HashSet<u64>) {
        for node in self.directories.values_mut() {
            node.inbound_operations
                .retain(|op| !indices.contains(&op.index));
        }
    }

    /// Every owned operation, sorted by index. Nothing is removed.
    pub fn all_operations(&self) -> Vec<Operation> {
        let mut operations: Vec<Operation> = self
            .directories
            .values()
            .flat_map(|node| node.operations.iter().cloned())
            .collect();
        operations.sort_by_key(|op| op.index);
        operations
    }

    pub(crate) fn clear(&mut self) {
        self.directories.clear();
    }
}

fn affects_from_above(path: &StandardizedPath, op: &Operation) -> bool {
    match &op.kind {
        OperationKind::DeleteDir(dir) => path.is_descendant_or_equal_of(dir),
        OperationKind::MoveDir { from, to } | OperationKind::CopyDir { from, to } => {
            path.is_descendant_or_equal_of(from) || path.is_descendant_or_equal_of(to)
        }
        OperationKind::DeleteFile(_) | OperationKind::Mkdir(_) => false,
    }
}
