use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use tracing::debug;

use tether_types::{FileRecord, LockInfo, LockState, StateDelta};

/// Reconciled state of every file the provider has seen, keyed by absolute
/// path.
#[derive(Debug, Default)]
pub struct StateCache {
    entries: Mutex<HashMap<PathBuf, FileRecord>>,
    recently_refreshed: Mutex<HashSet<PathBuf>>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, FileRecord>> {
        self.entries.lock().expect("state cache poisoned")
    }

    /// The record for `path`, or an all-unset record if the path is unknown.
    pub fn get(&self, path: &Path) -> FileRecord {
        self.find(path).unwrap_or_else(|| FileRecord::new(path))
    }

    pub fn find(&self, path: &Path) -> Option<FileRecord> {
        self.entries().get(path).cloned()
    }

    /// Merge deltas axis by axis. Lock users are checked against `identity`
    /// so that `Locked` always means "held by us". Returns the paths whose
    /// record changed.
    pub fn apply(&self, deltas: &BTreeMap<PathBuf, StateDelta>, identity: &str) -> Vec<PathBuf> {
        let now = Utc::now();
        let mut changed = Vec::new();
        {
            let mut entries = self.entries();
            for (path, delta) in deltas {
                let record = entries
                    .entry(path.clone())
                    .or_insert_with(|| FileRecord::new(path.clone()));
                let was_unknown = record.is_unknown();

                let delta = normalize_lock(delta, identity);
                if record.apply(&delta) {
                    changed.push(path.clone());
                }
                // Brand-new files stay flagged for another refresh.
                record.updated_at = if was_unknown { None } else { Some(now) };
            }
        }

        // Only the latest merge counts as a fresh refresh.
        *self.recently_refreshed.lock().expect("state cache poisoned") = deltas.keys().cloned().collect();
        debug!(merged = deltas.len(), changed = changed.len(), "state cache updated");
        changed
    }

    pub fn remove(&self, path: &Path) -> bool {
        self.entries().remove(path).is_some()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.entries().keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn records(&self) -> Vec<FileRecord> {
        let mut records: Vec<FileRecord> = self.entries().values().cloned().collect();
        records.sort_by(|a, b| a.path.cmp(&b.path));
        records
    }

    pub fn filter(&self, predicate: impl Fn(&FileRecord) -> bool) -> Vec<FileRecord> {
        self.records().into_iter().filter(|r| predicate(r)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Consume the "just refreshed" mark for `path`. Returns `true` if the
    /// path was part of the most recent merge and has not been taken since,
    /// meaning a forced refresh can skip it.
    pub fn take_recently_refreshed(&self, path: &Path) -> bool {
        self.recently_refreshed
            .lock()
            .expect("state cache poisoned")
            .remove(path)
    }

    pub fn clear(&self) {
        self.entries().clear();
        self.recently_refreshed.lock().expect("state cache poisoned").clear();
    }
}

fn normalize_lock(delta: &StateDelta, identity: &str) -> StateDelta {
    let Some(lock) = &delta.lock else {
        return delta.clone();
    };
    let state = match lock.state {
        LockState::Locked if lock.user != identity => LockState::LockedOther,
        LockState::LockedOther if lock.user == identity => LockState::Locked,
        other => other,
    };
    StateDelta {
        lock: Some(LockInfo::new(state, lock.user.clone())),
        ..delta.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_types::{FileState, RemoteInfo, TreeState};

    fn deltas(entries: &[(&str, StateDelta)]) -> BTreeMap<PathBuf, StateDelta> {
        entries.iter().map(|(p, d)| (PathBuf::from(p), d.clone())).collect()
    }

    #[test]
    fn unknown_path_yields_unset_record() {
        let cache = StateCache::new();
        let record = cache.get(Path::new("/r/a.txt"));
        assert!(record.tree.is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn merge_keeps_other_axes() {
        let cache = StateCache::new();
        cache.apply(
            &deltas(&[(
                "/r/a.uasset",
                StateDelta::new()
                    .with_tree(TreeState::Working)
                    .with_remote(RemoteInfo::not_at_head("origin/main")),
            )]),
            "alice",
        );
        cache.apply(
            &deltas(&[("/r/a.uasset", StateDelta::new().with_lock(LockInfo::owned_by("alice", "alice")))]),
            "alice",
        );

        let record = cache.get(Path::new("/r/a.uasset"));
        assert_eq!(record.tree, Some(TreeState::Working));
        assert_eq!(record.lock, Some(LockState::Locked));
        assert_eq!(record.head_branch, "origin/main");
    }

    #[test]
    fn applying_twice_is_idempotent() {
        let cache = StateCache::new();
        let batch = deltas(&[(
            "/r/a.uasset",
            StateDelta::new().with_tree(TreeState::Unmodified).with_file(FileState::Unknown),
        )]);

        assert_eq!(cache.apply(&batch, "alice").len(), 1);
        let once = cache.get(Path::new("/r/a.uasset"));
        assert!(cache.apply(&batch, "alice").is_empty());
        let twice = cache.get(Path::new("/r/a.uasset"));

        assert_eq!(once.tree, twice.tree);
        assert_eq!(once.file, twice.file);
        assert_eq!(once.lock, twice.lock);
    }

    #[test]
    fn lock_state_follows_identity() {
        let cache = StateCache::new();
        cache.apply(
            &deltas(&[
                ("/r/a.uasset", StateDelta::new().with_lock(LockInfo::new(LockState::Locked, "bob"))),
                ("/r/b.uasset", StateDelta::new().with_lock(LockInfo::new(LockState::LockedOther, "alice"))),
            ]),
            "alice",
        );

        assert_eq!(cache.get(Path::new("/r/a.uasset")).lock, Some(LockState::LockedOther));
        assert_eq!(cache.get(Path::new("/r/b.uasset")).lock, Some(LockState::Locked));
    }

    #[test]
    fn new_files_stay_flagged_for_refresh() {
        let cache = StateCache::new();
        let batch = deltas(&[("/r/new.uasset", StateDelta::new().with_tree(TreeState::Untracked))]);

        cache.apply(&batch, "alice");
        assert!(cache.get(Path::new("/r/new.uasset")).updated_at.is_none());

        cache.apply(&batch, "alice");
        assert!(cache.get(Path::new("/r/new.uasset")).updated_at.is_some());
    }

    #[test]
    fn refreshed_mark_is_one_shot() {
        let cache = StateCache::new();
        cache.apply(&deltas(&[("/r/a.txt", StateDelta::new().with_tree(TreeState::Unmodified))]), "alice");

        assert!(cache.take_recently_refreshed(Path::new("/r/a.txt")));
        assert!(!cache.take_recently_refreshed(Path::new("/r/a.txt")));
        assert!(!cache.take_recently_refreshed(Path::new("/r/b.txt")));
    }

    #[test]
    fn refreshed_marks_cover_only_latest_merge() {
        let cache = StateCache::new();
        cache.apply(&deltas(&[("/r/a.txt", StateDelta::new().with_tree(TreeState::Unmodified))]), "alice");
        cache.apply(&deltas(&[("/r/b.txt", StateDelta::new().with_tree(TreeState::Working))]), "alice");

        assert!(!cache.take_recently_refreshed(Path::new("/r/a.txt")));
        assert!(cache.take_recently_refreshed(Path::new("/r/b.txt")));

        cache.apply(&BTreeMap::new(), "alice");
        cache.apply(&deltas(&[("/r/b.txt", StateDelta::new().with_tree(TreeState::Working))]), "alice");
        cache.apply(&BTreeMap::new(), "alice");
        assert!(!cache.take_recently_refreshed(Path::new("/r/b.txt")));
    }

    #[test]
    fn remove_and_filter() {
        let cache = StateCache::new();
        cache.apply(
            &deltas(&[
                ("/r/a.uasset", StateDelta::new().with_file(FileState::Deleted)),
                ("/r/b.uasset", StateDelta::new().with_tree(TreeState::Working)),
            ]),
            "alice",
        );

        let deleted = cache.filter(|r| r.is_deleted());
        assert_eq!(deleted.len(), 1);
        assert!(cache.remove(Path::new("/r/a.uasset")));
        assert!(!cache.remove(Path::new("/r/a.uasset")));
        assert_eq!(cache.paths(), vec![PathBuf::from("/r/b.uasset")]);
    }
}
