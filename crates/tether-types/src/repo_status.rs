//! Repository status snapshot as served by the local daemon.
//!
//! Field names follow the daemon's camelCase JSON. Every field is optional on
//! the wire so older daemons that omit a list still decode.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::paths::normalize_relative;

/// A file entry in the modified or untracked lists.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusFile {
    pub path: String,
    pub locked_by: String,
}

impl StatusFile {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), locked_by: String::new() }
    }
}

/// Owner of a remote lock.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockOwner {
    pub name: String,
}

/// A lock held on the remote.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteLock {
    pub path: String,
    pub owner: LockOwner,
}

impl RemoteLock {
    pub fn new(path: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            owner: LockOwner { name: owner.into() },
        }
    }
}

/// Snapshot of the working copy relative to its tracked remote branch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RepoStatus {
    pub detached_head: bool,
    pub last_updated: String,
    pub branch: String,
    pub remote_branch: String,
    pub commits_ahead: i32,
    pub commits_behind: i32,
    pub commit_head_origin: String,
    pub untracked_files: Vec<StatusFile>,
    pub modified_files: Vec<StatusFile>,
    pub has_staged_changes: bool,
    pub has_local_changes: bool,
    pub conflict_upstream: bool,
    pub conflicts: Vec<String>,
    pub modified_upstream: Vec<String>,
    pub locks_ours: Vec<RemoteLock>,
    pub locks_theirs: Vec<RemoteLock>,
}

impl RepoStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `relative` is in the modified list.
    pub fn is_modified(&self, relative: &str) -> bool {
        contains_path(self.modified_files.iter().map(|f| f.path.as_str()), relative)
    }

    /// Returns `true` if `relative` is in the untracked list.
    pub fn is_untracked(&self, relative: &str) -> bool {
        contains_path(self.untracked_files.iter().map(|f| f.path.as_str()), relative)
    }

    /// Returns `true` if `relative` is in the conflict list.
    pub fn is_conflicted(&self, relative: &str) -> bool {
        contains_path(self.conflicts.iter().map(String::as_str), relative)
    }

    /// Every remote lock, ours and theirs, keyed by normalized relative path.
    pub fn lock_owners(&self) -> BTreeMap<String, String> {
        self.locks_ours
            .iter()
            .chain(self.locks_theirs.iter())
            .map(|lock| (normalize_relative(&lock.path), lock.owner.name.clone()))
            .collect()
    }
}

fn contains_path<'a>(mut entries: impl Iterator<Item = &'a str>, relative: &str) -> bool {
    let wanted = normalize_relative(relative);
    entries.any(|entry| normalize_relative(entry) == wanted)
}
