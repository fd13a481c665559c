//! The single display state derived from a [`FileRecord`].
//!
//! The four axes are collapsed with a fixed priority: divergence from the
//! tracked remote first, then foreign locks, then other-branch edits, then
//! local content changes, and finally the plain tracking state. Higher
//! conditions always win; two conditions are never combined.

use serde::{Deserialize, Serialize};

use crate::state::{FileRecord, FileState, LockState, RemoteState, TreeState};

/// Effective state of a file, highest priority first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectiveState {
    NotAtHead,
    LockedOther,
    NotLatest,
    Added,
    Unmerged,
    Deleted,
    Modified,
    Untracked,
    CheckedOut,
    Lockable,
    Unmodified,
    Ignored,
    None,
}

impl FileRecord {
    /// Collapse the four axes into one state.
    pub fn effective_state(&self) -> EffectiveState {
        if self.remote == Some(RemoteState::NotAtHead) {
            return EffectiveState::NotAtHead;
        }
        if self.lock == Some(LockState::LockedOther) {
            return EffectiveState::LockedOther;
        }
        if self.remote == Some(RemoteState::NotLatest) {
            return EffectiveState::NotLatest;
        }
        if self.is_added() {
            return EffectiveState::Added;
        }
        match self.file {
            Some(FileState::Unmerged) => return EffectiveState::Unmerged,
            Some(FileState::Deleted) => return EffectiveState::Deleted,
            Some(FileState::Modified) => return EffectiveState::Modified,
            _ => {}
        }
        if self.tree == Some(TreeState::Untracked) {
            return EffectiveState::Untracked;
        }
        if self.lock == Some(LockState::Locked) {
            return EffectiveState::CheckedOut;
        }
        if self.is_source_controlled() {
            if self.can_checkout() {
                return EffectiveState::Lockable;
            }
            return EffectiveState::Unmodified;
        }
        if self.tree == Some(TreeState::Ignored) {
            return EffectiveState::Ignored;
        }
        EffectiveState::None
    }

    /// Human-readable label for the effective state.
    pub fn display_name(&self) -> String {
        match self.effective_state() {
            EffectiveState::NotAtHead => "Not current".to_string(),
            EffectiveState::LockedOther => format!("Checked out by: {}", self.lock_user),
            EffectiveState::NotLatest => format!("Modified in branch: {}", self.head_branch),
            EffectiveState::Unmerged => "Conflicted".to_string(),
            EffectiveState::Added => "Opened for add".to_string(),
            EffectiveState::Untracked => "Not Under Revision Control".to_string(),
            EffectiveState::Deleted => "Marked for delete".to_string(),
            EffectiveState::Modified | EffectiveState::CheckedOut => "Checked out".to_string(),
            EffectiveState::Ignored => "Ignore".to_string(),
            EffectiveState::Lockable => "Read only".to_string(),
            EffectiveState::Unmodified => "Unmodified".to_string(),
            EffectiveState::None => "Unknown".to_string(),
        }
    }

    /// Not behind the tracked branch and not modified elsewhere.
    pub fn is_current(&self) -> bool {
        !matches!(self.remote, Some(RemoteState::NotAtHead) | Some(RemoteState::NotLatest))
    }

    pub fn is_source_controlled(&self) -> bool {
        !matches!(
            self.tree,
            Some(TreeState::Untracked) | Some(TreeState::Ignored) | Some(TreeState::NotInRepo)
        )
    }

    /// Staged files, and untracked files the local user holds the lock for.
    pub fn is_added(&self) -> bool {
        self.tree == Some(TreeState::Staged)
            || (self.tree == Some(TreeState::Untracked) && self.lock == Some(LockState::Locked))
    }

    pub fn is_checked_out(&self) -> bool {
        self.tree != Some(TreeState::Untracked) && self.lock == Some(LockState::Locked)
    }

    pub fn is_checked_out_other(&self) -> bool {
        self.lock == Some(LockState::LockedOther)
    }

    pub fn is_modified(&self) -> bool {
        matches!(self.tree, Some(TreeState::Working) | Some(TreeState::Staged))
    }

    pub fn is_deleted(&self) -> bool {
        self.file == Some(FileState::Deleted)
    }

    pub fn is_conflicted(&self) -> bool {
        self.file == Some(FileState::Unmerged)
    }

    pub fn is_ignored(&self) -> bool {
        self.tree == Some(TreeState::Ignored)
    }

    pub fn is_lockable(&self) -> bool {
        !matches!(self.lock, None | Some(LockState::Unlockable))
    }

    /// Out-of-date files cannot be checked out: editing a stale binary asset
    /// guarantees a conflict.
    pub fn can_checkout(&self) -> bool {
        if matches!(self.tree, Some(TreeState::NotInRepo) | Some(TreeState::Untracked)) {
            return false;
        }
        self.lock == Some(LockState::NotLocked) && self.is_current()
    }

    pub fn can_check_in(&self) -> bool {
        if self.is_added() {
            return true;
        }
        if !self.is_current() || self.is_conflicted() {
            return false;
        }
        if self.is_lockable() {
            self.lock == Some(LockState::Locked)
        } else {
            self.is_modified()
        }
    }

    pub fn can_revert(&self) -> bool {
        self.can_check_in() || self.is_modified()
    }

    pub fn can_edit(&self) -> bool {
        self.is_checked_out() || self.is_added()
    }

    pub fn can_delete(&self) -> bool {
        self.is_current() && !self.is_checked_out_other() && self.is_source_controlled()
    }

    pub fn can_add(&self) -> bool {
        self.tree == Some(TreeState::Untracked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{LockInfo, RemoteInfo, StateDelta};

    fn record(delta: StateDelta) -> FileRecord {
        let mut record = FileRecord::new("/repo/Content/A.uasset");
        record.apply(&delta);
        record
    }

    #[test]
    fn remote_divergence_beats_everything() {
        let r = record(
            StateDelta::new()
                .with_tree(TreeState::Working)
                .with_file(FileState::Unmerged)
                .with_lock(LockInfo::owned_by("bob", "alice"))
                .with_remote(RemoteInfo::not_at_head("origin/main")),
        );
        assert_eq!(r.effective_state(), EffectiveState::NotAtHead);
        assert_eq!(r.display_name(), "Not current");
    }

    #[test]
    fn foreign_lock_beats_other_branch() {
        let r = record(
            StateDelta::new()
                .with_lock(LockInfo::owned_by("bob", "alice"))
                .with_remote(RemoteInfo::not_latest("release")),
        );
        assert_eq!(r.effective_state(), EffectiveState::LockedOther);
        assert_eq!(r.display_name(), "Checked out by: bob");
    }

    #[test]
    fn untracked_and_locked_is_added() {
        let r = record(
            StateDelta::new()
                .with_tree(TreeState::Untracked)
                .with_lock(LockInfo::owned_by("alice", "alice")),
        );
        assert!(r.is_added());
        assert_eq!(r.effective_state(), EffectiveState::Added);
        assert!(r.can_check_in());
    }

    #[test]
    fn file_state_beats_tree_state() {
        let r = record(
            StateDelta::new()
                .with_tree(TreeState::Untracked)
                .with_file(FileState::Deleted),
        );
        assert_eq!(r.effective_state(), EffectiveState::Deleted);
    }

    #[test]
    fn unlocked_current_asset_is_lockable() {
        let r = record(
            StateDelta::new()
                .with_tree(TreeState::Unmodified)
                .with_lock(LockInfo::not_locked())
                .with_remote(RemoteInfo::up_to_date()),
        );
        assert!(r.can_checkout());
        assert_eq!(r.effective_state(), EffectiveState::Lockable);
        assert_eq!(r.display_name(), "Read only");
    }

    #[test]
    fn unlockable_file_is_unmodified() {
        let r = record(
            StateDelta::new()
                .with_tree(TreeState::Unmodified)
                .with_lock(LockInfo::unlockable()),
        );
        assert!(!r.can_checkout());
        assert_eq!(r.effective_state(), EffectiveState::Unmodified);
    }

    #[test]
    fn own_lock_is_checked_out() {
        let r = record(
            StateDelta::new()
                .with_tree(TreeState::Working)
                .with_lock(LockInfo::owned_by("alice", "alice")),
        );
        assert_eq!(r.effective_state(), EffectiveState::CheckedOut);
        assert!(r.can_edit());
        assert!(r.can_revert());
    }

    #[test]
    fn modified_plain_file_can_check_in() {
        let r = record(
            StateDelta::new()
                .with_tree(TreeState::Working)
                .with_lock(LockInfo::unlockable()),
        );
        assert!(r.can_check_in());
        assert!(!r.can_edit());
    }

    #[test]
    fn stale_file_cannot_check_in_or_checkout() {
        let r = record(
            StateDelta::new()
                .with_tree(TreeState::Working)
                .with_lock(LockInfo::not_locked())
                .with_remote(RemoteInfo::not_at_head("origin/main")),
        );
        assert!(!r.is_current());
        assert!(!r.can_checkout());
        assert!(!r.can_check_in());
        assert!(!r.can_delete());
    }

    #[test]
    fn unset_tree_is_unmodified_not_in_repo_is_none() {
        let r = FileRecord::new("x");
        assert_eq!(r.effective_state(), EffectiveState::Unmodified);
        let r = record(StateDelta::new().with_tree(TreeState::NotInRepo));
        assert_eq!(r.effective_state(), EffectiveState::None);
        assert_eq!(r.display_name(), "Unknown");
    }

    #[test]
    fn ignored_file() {
        let r = record(StateDelta::new().with_tree(TreeState::Ignored));
        assert!(r.is_ignored());
        assert_eq!(r.effective_state(), EffectiveState::Ignored);
        assert_eq!(r.display_name(), "Ignore");
    }
}
