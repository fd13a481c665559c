//! Per-file status reconciliation.
//!
//! Combines the daemon's [`RepoStatus`](tether_types::RepoStatus), the lock
//! listing, and what is actually on disk into one [`StateDelta`] per file.
//! Git itself is reached only through the [`GitRunner`] seam.
//!
//! # Key Types
//!
//! - [`StatusReconciler`]: Classifies candidate paths
//! - [`GitRunner`]: Opaque git invocation, batched at [`MAX_FILES_PER_BATCH`] files
//! - [`LockableTypes`]: File extensions subject to exclusive locking
//!
//! [`StateDelta`]: tether_types::StateDelta

pub mod error;
pub mod git;
pub mod lockable;
pub mod reconcile;

pub use error::{StatusError, StatusResult};
pub use git::{run_batched, GitOutput, GitRunner, SystemGit, MAX_FILES_PER_BATCH};
pub use lockable::LockableTypes;
pub use reconcile::StatusReconciler;
