//! Staged file system operations.
//!
//! Operations are queued per directory in a [`DirectoryTree`], viewed through
//! an overlay, and applied to a [`crate::host::FileSystemHost`] in queue order
//! by [`TransactionalFileSystem`].

mod casing;
mod directory;
mod operation;
pub mod transaction;

pub use casing::PathCasingMaintainer;
pub use directory::{Directory, DirectoryTree};
pub use operation::{Operation, OperationKind};
pub use transaction::{TransactionStats, TransactionalFileSystem};
