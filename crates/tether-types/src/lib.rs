//! Foundation types for tether.
//!
//! This crate provides the per-file state model shared by every other tether
//! crate: the four independent state axes, the partial updates that flow
//! between workers and the cache, and the repository status snapshot served
//! by the local daemon.
//!
//! # Key Types
//!
//! - [`FileRecord`]: Cached state of one file, one optional value per axis
//! - [`StateDelta`]: Partial update that touches only the axes it carries
//! - [`EffectiveState`]: Single display state derived from the four axes
//! - [`RepoStatus`]: Snapshot of the working copy as reported by the daemon
//! - [`LockListing`]: Lock owners keyed by absolute path
//! - [`TreeState`], [`FileState`], [`LockState`], [`RemoteState`]: The axes

pub mod effective;
pub mod error;
pub mod lock_listing;
pub mod paths;
pub mod repo_status;
pub mod state;

pub use effective::EffectiveState;
pub use error::{TypeError, TypeResult};
pub use lock_listing::LockListing;
pub use paths::{absolute_path, normalize_relative, relative_path};
pub use repo_status::{LockOwner, RemoteLock, RepoStatus, StatusFile};
pub use state::{
    FileRecord, FileState, LockInfo, LockState, RemoteInfo, RemoteState, StateDelta, TreeState,
};
