use std::path::PathBuf;

use serde::Serialize;

/// Notifications broadcast by the provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProviderEvent {
    /// Cached state changed for these paths. Sent at most once per tick.
    StateChanged { paths: Vec<PathBuf> },
    /// A command failed. All affected paths are listed in one notification.
    OperationFailed {
        operation: String,
        paths: Vec<PathBuf>,
        errors: Vec<String>,
    },
}
