//! Classification of candidate paths against a repository status snapshot.
//!
//! Paths are compared by their exact repo-relative form, so
//! `Content/A/B.uasset` never matches an entry for
//! `Plugins/X/Content/A/B.uasset`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use tether_types::{
    absolute_path, relative_path, FileState, LockInfo, LockListing, RemoteInfo, RepoStatus,
    StateDelta, TreeState,
};

use crate::error::StatusResult;
use crate::git::GitRunner;
use crate::lockable::LockableTypes;

/// Merges daemon status, lock ownership, and the filesystem into per-file
/// state deltas.
pub struct StatusReconciler {
    repo_root: PathBuf,
    lockable: Arc<LockableTypes>,
    git: Arc<dyn GitRunner>,
}

impl StatusReconciler {
    pub fn new(repo_root: impl Into<PathBuf>, lockable: Arc<LockableTypes>, git: Arc<dyn GitRunner>) -> Self {
        Self { repo_root: repo_root.into(), lockable, git }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn lockable(&self) -> &LockableTypes {
        &self.lockable
    }

    pub fn git(&self) -> &dyn GitRunner {
        self.git.as_ref()
    }

    /// Resolve a caller-supplied path against the repository root.
    pub fn absolutize(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.repo_root.join(path)
        }
    }

    /// Drop paths outside the repository and replace directories with their
    /// tracked and untracked member files.
    pub fn expand(&self, paths: &[PathBuf]) -> StatusResult<Vec<PathBuf>> {
        let mut expanded = BTreeSet::new();
        for path in paths {
            let path = self.absolutize(path);
            let Ok(relative) = relative_path(&self.repo_root, &path) else {
                debug!(path = %path.display(), "skipping path outside repository");
                continue;
            };
            if !path.is_dir() {
                expanded.insert(path);
                continue;
            }

            let params = ["--cached", "--others", "--exclude-standard"].map(String::from);
            let files = if relative.is_empty() { Vec::new() } else { vec![relative] };
            let output = self.git.run("ls-files", &params, &files)?.into_result("ls-files")?;
            expanded.extend(output.stdout.iter().map(|line| absolute_path(&self.repo_root, line)));
        }
        Ok(expanded.into_iter().collect())
    }

    /// Classify every candidate. Candidates must already be expanded.
    pub fn reconcile(
        &self,
        status: &RepoStatus,
        listing: &LockListing,
        identity: &str,
        candidates: &[PathBuf],
    ) -> BTreeMap<PathBuf, StateDelta> {
        let mut deltas = BTreeMap::new();

        for path in candidates {
            let relative = match relative_path(&self.repo_root, path) {
                Ok(relative) => relative,
                Err(e) => {
                    warn!(error = %e, "cannot classify path");
                    continue;
                }
            };
            let exists = path.exists();

            let listed = if status.is_modified(&relative) {
                Some(TreeState::Working)
            } else if status.is_untracked(&relative) {
                Some(TreeState::Untracked)
            } else {
                None
            };
            let tree = listed.unwrap_or(if exists { TreeState::Unmodified } else { TreeState::NotInRepo });
            let file = if listed.is_some() && !exists {
                FileState::Deleted
            } else if status.is_conflicted(&relative) {
                FileState::Unmerged
            } else {
                FileState::Unknown
            };

            let delta = StateDelta::new()
                .with_tree(tree)
                .with_file(file)
                .with_lock(self.lock_info(path, listing, identity))
                .with_remote(RemoteInfo::up_to_date());
            deltas.insert(path.clone(), delta);
        }

        // Upstream changes only mark paths already classified above.
        for relative in &status.modified_upstream {
            let path = absolute_path(&self.repo_root, relative);
            if let Some(delta) = deltas.get_mut(&path) {
                delta.remote = Some(RemoteInfo::not_at_head(status.remote_branch.clone()));
            }
        }

        debug!(candidates = candidates.len(), classified = deltas.len(), "reconciled status");
        deltas
    }

    /// Lock-axis-only deltas, for when no status snapshot is available.
    pub fn resolve_locks(
        &self,
        listing: &LockListing,
        identity: &str,
        candidates: &[PathBuf],
    ) -> BTreeMap<PathBuf, StateDelta> {
        candidates
            .iter()
            .map(|path| (path.clone(), StateDelta::new().with_lock(self.lock_info(path, listing, identity))))
            .collect()
    }

    pub fn lock_info(&self, path: &Path, listing: &LockListing, identity: &str) -> LockInfo {
        if !self.lockable.is_lockable(path) {
            return LockInfo::unlockable();
        }
        match listing.owner(path) {
            Some(owner) => LockInfo::owned_by(owner, identity),
            None => LockInfo::not_locked(),
        }
    }
}
