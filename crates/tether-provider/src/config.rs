use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the [`Provider`](crate::Provider).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Root of the working copy. Relative paths given to operations resolve
    /// against it.
    pub repo_root: PathBuf,
    /// Local lock identity. When unset, the daemon's user is used.
    pub identity: Option<String>,
    /// Directories, relative to the root, refreshed by a full status pass.
    pub status_roots: Vec<String>,
    /// Patterns probed for the `lockable` attribute, and the fallback
    /// registry when probing fails.
    pub lockable_patterns: Vec<String>,
    /// Seconds between background status refreshes.
    pub refresh_interval_secs: u64,
    /// Seconds before the lock listing is considered stale.
    pub lock_ttl_secs: u64,
    /// Milliseconds between queue ticks while a synchronous caller waits.
    pub sync_poll_interval_ms: u64,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            repo_root: PathBuf::from("."),
            identity: None,
            status_roots: vec!["Content".into(), "Config".into()],
            lockable_patterns: vec!["*.uasset".into(), "*.umap".into()],
            refresh_interval_secs: 30,
            lock_ttl_secs: 30,
            sync_poll_interval_ms: 10,
            event_capacity: 256,
        }
    }
}

impl ProviderConfig {
    pub fn for_repo(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            ..Self::default()
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    pub fn sync_poll_interval(&self) -> Duration {
        Duration::from_millis(self.sync_poll_interval_ms.max(1))
    }

    /// Status roots as absolute paths.
    pub fn status_root_paths(&self) -> Vec<PathBuf> {
        self.status_roots.iter().map(|root| self.repo_root.join(root)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ProviderConfig::for_repo("/work/game");
        assert_eq!(config.refresh_interval(), Duration::from_secs(30));
        assert_eq!(config.lock_ttl(), Duration::from_secs(30));
        assert_eq!(config.sync_poll_interval(), Duration::from_millis(10));
        assert_eq!(
            config.status_root_paths(),
            vec![PathBuf::from("/work/game/Content"), PathBuf::from("/work/game/Config")]
        );
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config: ProviderConfig =
            serde_json::from_str(r#"{"repo_root": "/r", "identity": "alice"}"#).unwrap();
        assert_eq!(config.identity.as_deref(), Some("alice"));
        assert_eq!(config.lockable_patterns, vec!["*.uasset".to_string(), "*.umap".to_string()]);
    }
}
