use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A revision-control operation and its typed payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    /// Connectivity probe. Never changes file state.
    Connect,
    /// Acquire exclusive locks on the lockable files.
    CheckOut,
    /// Same mechanism as `CheckOut`: locking a new file is what adds it.
    MarkForAdd,
    /// Lock, then remove the files from disk.
    Delete,
    /// Submit the files with a commit message.
    CheckIn { message: String },
    /// Discard local changes and release our locks.
    Revert,
    /// Force a status refresh over the status roots.
    Fetch { update_status: bool },
    /// Re-resolve the files from the cached status.
    UpdateStatus,
    /// Mark conflicted files as resolved.
    Resolve,
    /// Lock the copy destination.
    Copy { destination: PathBuf },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect => "Connect",
            Self::CheckOut => "CheckOut",
            Self::MarkForAdd => "MarkForAdd",
            Self::Delete => "Delete",
            Self::CheckIn { .. } => "CheckIn",
            Self::Revert => "Revert",
            Self::Fetch { .. } => "Fetch",
            Self::UpdateStatus => "UpdateStatus",
            Self::Resolve => "Resolve",
            Self::Copy { .. } => "Copy",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How the issuer waits for a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Concurrency {
    /// The issuer runs the worker inline and ticks the queue until done.
    Synchronous,
    /// The worker runs on its own task; completion arrives on a later tick.
    Asynchronous,
}

/// Whether a state query may answer from the cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CacheUsage {
    #[default]
    Use,
    /// Re-resolve paths that were not merged since the last forced query.
    ForceUpdate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_ignore_payload() {
        assert_eq!(Operation::CheckIn { message: "wip".into() }.name(), "CheckIn");
        assert_eq!(Operation::Fetch { update_status: false }.to_string(), "Fetch");
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(Operation::Copy { destination: "Content/B.uasset".into() }).unwrap();
        assert_eq!(json["kind"], "copy");
        assert_eq!(json["destination"], "Content/B.uasset");
    }
}
