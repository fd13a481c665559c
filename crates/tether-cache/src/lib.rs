//! In-memory caches behind the provider.
//!
//! Both caches are written only by the provider's tick. Readers on any
//! thread take a short exclusive section.
//!
//! # Key Types
//!
//! - [`StateCache`]: Reconciled [`FileRecord`](tether_types::FileRecord) per absolute path
//! - [`LockCache`]: Lock owners, authoritative tier plus optimistic overlay
//! - [`FileAttributes`]: Read-only flag side effect for locks held locally

pub mod attributes;
pub mod error;
pub mod lock_cache;
pub mod state_cache;

pub use attributes::{FileAttributes, FsAttributes, NoopAttributes};
pub use error::{CacheError, CacheResult};
pub use lock_cache::{LockCache, LockUpdate};
pub use state_cache::StateCache;
