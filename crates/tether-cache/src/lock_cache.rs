//! Two-tier mirror of remote lock ownership.
//!
//! The authoritative tier holds the last full listing fetched from the
//! daemon. The overlay holds optimistic writes made right after a successful
//! lock or unlock call. Reads consult the overlay first.
//!
//! When a new listing arrives with [`LockCache::set`], overlay entries
//! recorded after the listing was fetched survive, because the listing may
//! predate them. Older overlay entries are dropped and the listing wins.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use tether_types::LockListing;

use crate::attributes::FileAttributes;

/// Default lifetime of an authoritative listing.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(30);

/// A mutation produced by a worker and applied by the provider's tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LockUpdate {
    /// Optimistic lock by `owner`.
    Add { path: PathBuf, owner: String },
    /// Optimistic unlock.
    Remove { path: PathBuf },
    /// Authoritative listing fetched at `as_of`.
    Replace { listing: LockListing, as_of: Instant },
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Pending {
    Locked(String),
    Unlocked,
}

#[derive(Clone, Debug)]
struct OverlayEntry {
    pending: Pending,
    at: Instant,
}

#[derive(Debug, Default)]
struct Tiers {
    authoritative: LockListing,
    fetched_at: Option<Instant>,
    overlay: BTreeMap<PathBuf, OverlayEntry>,
}

impl Tiers {
    fn owner(&self, path: &Path) -> Option<String> {
        match self.overlay.get(path) {
            Some(OverlayEntry { pending: Pending::Locked(owner), .. }) => Some(owner.clone()),
            Some(OverlayEntry { pending: Pending::Unlocked, .. }) => None,
            None => self.authoritative.owner(path).map(str::to_string),
        }
    }

    fn effective(&self) -> LockListing {
        let mut listing = self.authoritative.clone();
        for (path, entry) in &self.overlay {
            match &entry.pending {
                Pending::Locked(owner) => {
                    listing.insert(path.clone(), owner.clone());
                }
                Pending::Unlocked => {
                    listing.remove(path);
                }
            }
        }
        listing
    }

    fn replace(&mut self, listing: LockListing, as_of: Instant) {
        self.authoritative = listing;
        self.fetched_at = Some(self.fetched_at.map_or(as_of, |prev| prev.max(as_of)));
        self.overlay.retain(|_, entry| entry.at > as_of);
    }
}

/// Process-wide lock owner cache.
pub struct LockCache {
    identity: RwLock<String>,
    ttl: Duration,
    tiers: Mutex<Tiers>,
    attributes: Arc<dyn FileAttributes>,
}

impl LockCache {
    pub fn new(identity: impl Into<String>, ttl: Duration, attributes: Arc<dyn FileAttributes>) -> Self {
        Self {
            identity: RwLock::new(identity.into()),
            ttl,
            tiers: Mutex::new(Tiers::default()),
            attributes,
        }
    }

    pub fn identity(&self) -> String {
        self.identity.read().expect("lock cache identity poisoned").clone()
    }

    pub fn set_identity(&self, identity: impl Into<String>) {
        *self.identity.write().expect("lock cache identity poisoned") = identity.into();
    }

    fn tiers(&self) -> std::sync::MutexGuard<'_, Tiers> {
        self.tiers.lock().expect("lock cache poisoned")
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn owner(&self, path: &Path) -> Option<String> {
        self.tiers().owner(path)
    }

    /// Effective listing: authoritative tier with the overlay applied.
    pub fn snapshot(&self) -> LockListing {
        self.tiers().effective()
    }

    /// The effective listing [`LockCache::set`] would produce, without
    /// changing anything.
    pub fn preview(&self, listing: &LockListing, as_of: Instant) -> LockListing {
        let mut tiers = Tiers {
            authoritative: LockListing::new(),
            fetched_at: None,
            overlay: self.tiers().overlay.clone(),
        };
        tiers.replace(listing.clone(), as_of);
        tiers.effective()
    }

    /// An authoritative listing older than the TTL, or none at all, is stale.
    pub fn is_stale(&self, now: Instant) -> bool {
        match self.tiers().fetched_at {
            Some(fetched_at) => now.saturating_duration_since(fetched_at) >= self.ttl,
            None => true,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.tiers().overlay.len()
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Replace the authoritative tier. Returns the paths whose effective
    /// owner changed.
    pub fn set(&self, listing: LockListing, as_of: Instant) -> Vec<PathBuf> {
        let (before, after) = {
            let mut tiers = self.tiers();
            let before = tiers.effective();
            tiers.replace(listing, as_of);
            (before, tiers.effective())
        };

        let paths: BTreeSet<&PathBuf> = before.iter().chain(after.iter()).map(|(p, _)| p).collect();
        let changed: Vec<PathBuf> = paths
            .into_iter()
            .filter(|path| before.owner(path) != after.owner(path))
            .cloned()
            .collect();
        for path in &changed {
            self.on_owner_changed(path, before.owner(path), after.owner(path));
        }
        debug!(locks = after.len(), changed = changed.len(), "lock cache refreshed");
        changed
    }

    /// Optimistically record a lock.
    pub fn add(&self, path: impl Into<PathBuf>, owner: impl Into<String>) {
        self.record(path.into(), Pending::Locked(owner.into()));
    }

    /// Optimistically record an unlock.
    pub fn remove(&self, path: impl Into<PathBuf>) {
        self.record(path.into(), Pending::Unlocked);
    }

    pub fn apply(&self, update: LockUpdate) {
        match update {
            LockUpdate::Add { path, owner } => self.add(path, owner),
            LockUpdate::Remove { path } => self.remove(path),
            LockUpdate::Replace { listing, as_of } => {
                self.set(listing, as_of);
            }
        }
    }

    pub fn clear(&self) {
        *self.tiers() = Tiers::default();
    }

    fn record(&self, path: PathBuf, pending: Pending) {
        let (before, after) = {
            let mut tiers = self.tiers();
            let before = tiers.owner(&path);
            tiers.overlay.insert(path.clone(), OverlayEntry { pending, at: Instant::now() });
            (before, tiers.owner(&path))
        };
        if before != after {
            self.on_owner_changed(&path, before.as_deref(), after.as_deref());
        }
    }

    /// Only locks involving the local identity touch file permissions: a
    /// file is writable exactly while we hold its lock.
    fn on_owner_changed(&self, path: &Path, before: Option<&str>, after: Option<&str>) {
        let identity = self.identity();
        let ours_before = before == Some(identity.as_str());
        let ours_after = after == Some(identity.as_str());
        if !ours_before && !ours_after {
            return;
        }
        if let Err(e) = self.attributes.set_read_only(path, !ours_after) {
            warn!(error = %e, "failed to update read-only flag");
        }
    }
}
