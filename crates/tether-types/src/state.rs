//! Per-file state axes and the merge rules between them.
//!
//! A file's state is tracked on four orthogonal axes. Each axis is learned
//! from a different source (git working tree, conflict/deletion detection,
//! the lock service, and upstream divergence) and is updated independently:
//! a [`StateDelta`] only overwrites the axes it carries.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Working-tree classification of a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TreeState {
    /// Not on disk and never tracked.
    NotInRepo,
    /// On disk but not tracked.
    Untracked,
    /// Tracked and unchanged.
    Unmodified,
    /// Tracked and modified, not staged.
    Working,
    /// Tracked and staged.
    Staged,
    /// Matched by an ignore rule.
    Ignored,
}

/// Content-level condition of a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileState {
    Unknown,
    /// Conflicted.
    Unmerged,
    Deleted,
    Modified,
}

/// Exclusive-lock condition of a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockState {
    /// The file type is not subject to locking.
    Unlockable,
    NotLocked,
    /// Locked by the local identity.
    Locked,
    /// Locked by someone else.
    LockedOther,
}

/// Divergence of the local copy from the tracked remote.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteState {
    UpToDate,
    /// The local commit is behind the tracked branch for this file.
    NotAtHead,
    /// Modified in a higher-priority branch.
    NotLatest,
}

/// Lock axis value together with the owning user.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockInfo {
    pub state: LockState,
    pub user: String,
}

impl LockInfo {
    pub fn new(state: LockState, user: impl Into<String>) -> Self {
        Self { state, user: user.into() }
    }

    pub fn unlockable() -> Self {
        Self::new(LockState::Unlockable, "")
    }

    pub fn not_locked() -> Self {
        Self::new(LockState::NotLocked, "")
    }

    /// Classify an owner against the local identity.
    pub fn owned_by(owner: &str, identity: &str) -> Self {
        if owner == identity {
            Self::new(LockState::Locked, owner)
        } else {
            Self::new(LockState::LockedOther, owner)
        }
    }
}

/// Remote axis value together with the branch it refers to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteInfo {
    pub state: RemoteState,
    pub branch: String,
}

impl RemoteInfo {
    pub fn up_to_date() -> Self {
        Self { state: RemoteState::UpToDate, branch: String::new() }
    }

    pub fn not_at_head(branch: impl Into<String>) -> Self {
        Self { state: RemoteState::NotAtHead, branch: branch.into() }
    }

    pub fn not_latest(branch: impl Into<String>) -> Self {
        Self { state: RemoteState::NotLatest, branch: branch.into() }
    }
}

/// A partial state update. `None` axes are left untouched when applied.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDelta {
    pub tree: Option<TreeState>,
    pub file: Option<FileState>,
    pub lock: Option<LockInfo>,
    pub remote: Option<RemoteInfo>,
}

impl StateDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tree(mut self, tree: TreeState) -> Self {
        self.tree = Some(tree);
        self
    }

    pub fn with_file(mut self, file: FileState) -> Self {
        self.file = Some(file);
        self
    }

    pub fn with_lock(mut self, lock: LockInfo) -> Self {
        self.lock = Some(lock);
        self
    }

    pub fn with_remote(mut self, remote: RemoteInfo) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Returns `true` if the delta carries no axis at all.
    pub fn is_empty(&self) -> bool {
        self.tree.is_none() && self.file.is_none() && self.lock.is_none() && self.remote.is_none()
    }

    /// Fold a later delta into this one. Axes set in `later` win.
    pub fn merge(&mut self, later: &StateDelta) {
        if let Some(tree) = later.tree {
            self.tree = Some(tree);
        }
        if let Some(file) = later.file {
            self.file = Some(file);
        }
        if let Some(lock) = &later.lock {
            self.lock = Some(lock.clone());
        }
        if let Some(remote) = &later.remote {
            self.remote = Some(remote.clone());
        }
    }
}

/// Cached state of a single file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: PathBuf,
    pub tree: Option<TreeState>,
    pub file: Option<FileState>,
    pub lock: Option<LockState>,
    pub lock_user: String,
    pub remote: Option<RemoteState>,
    pub head_branch: String,
    /// When the record was last merged. `None` means the record must be refreshed.
    pub updated_at: Option<DateTime<Utc>>,
}

impl FileRecord {
    /// A record with every axis unset.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            tree: None,
            file: None,
            lock: None,
            lock_user: String::new(),
            remote: None,
            head_branch: String::new(),
            updated_at: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply a delta axis by axis. Returns `true` if any axis changed.
    pub fn apply(&mut self, delta: &StateDelta) -> bool {
        let before = (
            self.tree,
            self.file,
            self.lock,
            self.lock_user.clone(),
            self.remote,
            self.head_branch.clone(),
        );

        if let Some(tree) = delta.tree {
            self.tree = Some(tree);
        }
        if let Some(file) = delta.file {
            self.file = Some(file);
        }
        if let Some(lock) = &delta.lock {
            self.lock = Some(lock.state);
            self.lock_user = lock.user.clone();
        }
        if let Some(remote) = &delta.remote {
            self.remote = Some(remote.state);
            // An up-to-date file has no divergent branch to report.
            self.head_branch = match remote.state {
                RemoteState::UpToDate => String::new(),
                _ => remote.branch.clone(),
            };
        }

        before
            != (
                self.tree,
                self.file,
                self.lock,
                self.lock_user.clone(),
                self.remote,
                self.head_branch.clone(),
            )
    }

    /// Returns `true` if the daemon knows nothing about this file.
    pub fn is_unknown(&self) -> bool {
        matches!(self.file, None | Some(FileState::Unknown))
            && matches!(self.tree, None | Some(TreeState::NotInRepo))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn lock_info_classifies_owner() {
        assert_eq!(LockInfo::owned_by("alice", "alice").state, LockState::Locked);
        assert_eq!(LockInfo::owned_by("bob", "alice").state, LockState::LockedOther);
    }

    #[test]
    fn lock_only_delta_keeps_tree_axis() {
        let mut record = FileRecord::new("/repo/Content/A.uasset");
        record.apply(&StateDelta::new().with_tree(TreeState::Working).with_file(FileState::Unknown));
        record.apply(&StateDelta::new().with_lock(LockInfo::owned_by("alice", "alice")));

        assert_eq!(record.tree, Some(TreeState::Working));
        assert_eq!(record.file, Some(FileState::Unknown));
        assert_eq!(record.lock, Some(LockState::Locked));
        assert_eq!(record.lock_user, "alice");
    }

    #[test]
    fn up_to_date_clears_head_branch() {
        let mut record = FileRecord::new("a.uasset");
        record.apply(&StateDelta::new().with_remote(RemoteInfo::not_at_head("origin/main")));
        assert_eq!(record.head_branch, "origin/main");

        record.apply(&StateDelta::new().with_remote(RemoteInfo {
            state: RemoteState::UpToDate,
            branch: "ignored".into(),
        }));
        assert_eq!(record.remote, Some(RemoteState::UpToDate));
        assert!(record.head_branch.is_empty());
    }

    #[test]
    fn apply_reports_change() {
        let mut record = FileRecord::new("a.txt");
        let delta = StateDelta::new().with_tree(TreeState::Unmodified);
        assert!(record.apply(&delta));
        assert!(!record.apply(&delta));
        assert!(!record.apply(&StateDelta::new()));
    }

    #[test]
    fn merge_later_axes_win() {
        let mut first = StateDelta::new()
            .with_tree(TreeState::Working)
            .with_lock(LockInfo::not_locked());
        let later = StateDelta::new().with_lock(LockInfo::owned_by("me", "me"));
        first.merge(&later);

        assert_eq!(first.tree, Some(TreeState::Working));
        assert_eq!(first.lock, Some(LockInfo::owned_by("me", "me")));
    }

    #[test]
    fn new_record_is_unknown() {
        let record = FileRecord::new("x");
        assert!(record.is_unknown());
        assert!(record.updated_at.is_none());
    }

    fn tree_strategy() -> impl Strategy<Value = Option<TreeState>> {
        prop::option::of(prop_oneof![
            Just(TreeState::NotInRepo),
            Just(TreeState::Untracked),
            Just(TreeState::Unmodified),
            Just(TreeState::Working),
            Just(TreeState::Staged),
            Just(TreeState::Ignored),
        ])
    }

    fn file_strategy() -> impl Strategy<Value = Option<FileState>> {
        prop::option::of(prop_oneof![
            Just(FileState::Unknown),
            Just(FileState::Unmerged),
            Just(FileState::Deleted),
            Just(FileState::Modified),
        ])
    }

    fn lock_strategy() -> impl Strategy<Value = Option<LockInfo>> {
        prop::option::of(
            (
                prop_oneof![
                    Just(LockState::Unlockable),
                    Just(LockState::NotLocked),
                    Just(LockState::Locked),
                    Just(LockState::LockedOther),
                ],
                "[a-z]{0,6}",
            )
                .prop_map(|(state, user)| LockInfo::new(state, user)),
        )
    }

    fn remote_strategy() -> impl Strategy<Value = Option<RemoteInfo>> {
        prop::option::of(
            (
                prop_oneof![
                    Just(RemoteState::UpToDate),
                    Just(RemoteState::NotAtHead),
                    Just(RemoteState::NotLatest),
                ],
                "[a-z/]{0,8}",
            )
                .prop_map(|(state, branch)| RemoteInfo { state, branch }),
        )
    }

    fn delta_strategy() -> impl Strategy<Value = StateDelta> {
        (tree_strategy(), file_strategy(), lock_strategy(), remote_strategy())
            .prop_map(|(tree, file, lock, remote)| StateDelta { tree, file, lock, remote })
    }

    proptest! {
        #[test]
        fn applying_a_delta_twice_equals_applying_once(seed in delta_strategy(), delta in delta_strategy()) {
            let mut once = FileRecord::new("p");
            once.apply(&seed);
            let mut twice = once.clone();

            once.apply(&delta);
            twice.apply(&delta);
            let changed_again = twice.apply(&delta);

            prop_assert_eq!(once, twice);
            prop_assert!(!changed_again);
        }

        #[test]
        fn unset_axes_survive_any_delta(delta in delta_strategy()) {
            let mut record = FileRecord::new("p");
            record.apply(&StateDelta::new()
                .with_tree(TreeState::Staged)
                .with_file(FileState::Modified)
                .with_lock(LockInfo::owned_by("me", "me"))
                .with_remote(RemoteInfo::not_latest("release")));
            record.apply(&delta);

            if delta.tree.is_none() { prop_assert_eq!(record.tree, Some(TreeState::Staged)); }
            if delta.file.is_none() { prop_assert_eq!(record.file, Some(FileState::Modified)); }
            if delta.lock.is_none() { prop_assert_eq!(record.lock, Some(LockState::Locked)); }
            if delta.remote.is_none() { prop_assert_eq!(record.remote, Some(RemoteState::NotLatest)); }
        }
    }
}
