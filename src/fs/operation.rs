use crate::path::StandardizedPath;
use std::fmt;

/// What a queued operation does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    /// Remove a single file.
    DeleteFile(StandardizedPath),
    /// Remove a directory and everything below it.
    DeleteDir(StandardizedPath),
    /// Create a directory (and any missing ancestors).
    Mkdir(StandardizedPath),
    /// Move a directory; the source location ceases to exist.
    MoveDir {
        from: StandardizedPath,
        to: StandardizedPath,
    },
    /// Copy a directory; the source is left untouched.
    CopyDir {
        from: StandardizedPath,
        to: StandardizedPath,
    },
}

/// A queued file system operation.
///
/// `index` comes from a single counter owned by the coordinator, so sorting
/// by it reproduces the order in which operations were queued regardless of
/// which directory holds them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub index: u64,
    pub kind: OperationKind,
}

impl Operation {
    pub fn new(index: u64, kind: OperationKind) -> Self {
        Self { index, kind }
    }

    /// Short tag used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            OperationKind::DeleteFile(_) => "deleteFile",
            OperationKind::DeleteDir(_) => "deleteDir",
            OperationKind::Mkdir(_) => "mkdir",
            OperationKind::MoveDir { .. } => "move",
            OperationKind::CopyDir { .. } => "copy",
        }
    }

    /// Path whose containing directory owns this operation: the target of a
    /// delete or mkdir, or the source of a move or copy.
    pub fn subject(&self) -> &StandardizedPath {
        match &self.kind {
            OperationKind::DeleteFile(path)
            | OperationKind::DeleteDir(path)
            | OperationKind::Mkdir(path) => path,
            OperationKind::MoveDir { from, .. } | OperationKind::CopyDir { from, .. } => from,
        }
    }

    /// Source and destination for moves and copies.
    pub fn move_or_copy_paths(&self) -> Option<(&StandardizedPath, &StandardizedPath)> {
        match &self.kind {
            OperationKind::MoveDir { from, to } | OperationKind::CopyDir { from, to } => {
                Some((from, to))
            }
            _ => None,
        }
    }

    pub fn is_mkdir_of(&self, dir: &StandardizedPath) -> bool {
        matches!(&self.kind, OperationKind::Mkdir(path) if path == dir)
    }

    pub fn is_file_delete_of(&self, file: &StandardizedPath) -> bool {
        matches!(&self.kind, OperationKind::DeleteFile(path) if path == file)
    }

    pub fn is_dir_delete_of(&self, dir: &StandardizedPath) -> bool {
        matches!(&self.kind, OperationKind::DeleteDir(path) if path == dir)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            OperationKind::DeleteFile(path)
            | OperationKind::DeleteDir(path)
            | OperationKind::Mkdir(path) => write!(f, "{}: {}", self.kind_name(), path),
            OperationKind::MoveDir { from, to } | OperationKind::CopyDir { from, to } => {
                write!(f, "{}: {} -> {}", self.kind_name(), from, to)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(path: &str) -> StandardizedPath {
        StandardizedPath::new(path)
    }

    #[test]
    fn test_display_lists_paths() {
        let mv = Operation::new(
            3,
            OperationKind::MoveDir {
                from: p("/a"),
                to: p("/b"),
            },
        );
        assert_eq!(mv.to_string(), "move: /a -> /b");
        assert_eq!(
            Operation::new(1, OperationKind::DeleteDir(p("/x"))).to_string(),
            "deleteDir: /x"
        );
    }

    #[test]
    fn test_subject_is_source_for_moves() {
        let cp = Operation::new(
            1,
            OperationKind::CopyDir {
                from: p("/a/src"),
                to: p("/b"),
            },
        );
        assert_eq!(cp.subject(), &p("/a/src"));
        assert!(cp.move_or_copy_paths().is_some());
        assert!(Operation::new(2, OperationKind::Mkdir(p("/m"))).is_mkdir_of(&p("/m")));
    }
}
