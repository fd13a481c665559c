use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::paths::absolute_path;
use crate::repo_status::RepoStatus;

/// Lock owners keyed by absolute path.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockListing {
    owners: BTreeMap<PathBuf, String>,
}

impl LockListing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every lock in the status, ours and theirs, resolved against `root`.
    pub fn from_status(root: &Path, status: &RepoStatus) -> Self {
        let owners = status
            .lock_owners()
            .into_iter()
            .map(|(relative, owner)| (absolute_path(root, &relative), owner))
            .collect();
        Self { owners }
    }

    pub fn owner(&self, path: &Path) -> Option<&str> {
        self.owners.get(path).map(String::as_str)
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, owner: impl Into<String>) -> Option<String> {
        self.owners.insert(path.into(), owner.into())
    }

    pub fn remove(&mut self, path: &Path) -> Option<String> {
        self.owners.remove(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &String)> {
        self.owners.iter()
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

impl FromIterator<(PathBuf, String)> for LockListing {
    fn from_iter<I: IntoIterator<Item = (PathBuf, String)>>(iter: I) -> Self {
        Self { owners: iter.into_iter().collect() }
    }
}
