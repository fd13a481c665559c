use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection settings for the daemon.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    /// Submit and upload can run for minutes, so the timeout is generous.
    pub timeout_secs: u64,
    /// Overrides the default token file location.
    pub token_path: Option<PathBuf>,
    /// Overrides the default legacy token file location.
    pub legacy_token_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8484".into(),
            timeout_secs: 300,
            token_path: None,
            legacy_token_path: None,
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Token file candidates, primary first.
    pub fn token_paths(&self) -> Vec<PathBuf> {
        let config_dir = dirs::config_dir();
        let primary = self
            .token_path
            .clone()
            .or_else(|| config_dir.as_ref().map(|d| default_token_path(d, "Friendshipper")));
        let legacy = self
            .legacy_token_path
            .clone()
            .or_else(|| config_dir.as_ref().map(|d| default_token_path(d, "Fellowshipper")));
        primary.into_iter().chain(legacy).collect()
    }
}

fn default_token_path(config_dir: &std::path::Path, app: &str) -> PathBuf {
    config_dir.join(app).join("data").join(".nonce")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = ClientConfig::default();
        assert_eq!(c.base_url, "http://localhost:8484");
        assert_eq!(c.timeout(), Duration::from_secs(300));
    }

    #[test]
    fn explicit_token_paths_win() {
        let c = ClientConfig {
            token_path: Some("/tmp/a".into()),
            legacy_token_path: Some("/tmp/b".into()),
            ..ClientConfig::default()
        };
        assert_eq!(c.token_paths(), vec![PathBuf::from("/tmp/a"), PathBuf::from("/tmp/b")]);
    }

    #[test]
    fn partial_config_uses_defaults() {
        let c: ClientConfig = serde_json::from_str(r#"{"base_url": "http://127.0.0.1:9000"}"#).unwrap();
        assert_eq!(c.base_url, "http://127.0.0.1:9000");
        assert_eq!(c.timeout_secs, 300);
        assert!(c.token_path.is_none());
    }
}
