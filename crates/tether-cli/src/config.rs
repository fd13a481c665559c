use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use tether_client::ClientConfig;
use tether_provider::ProviderConfig;
use tether_server::ServerConfig;

/// Everything the binary can be configured with, one table per component.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TetherConfig {
    pub client: ClientConfig,
    pub provider: ProviderConfig,
    pub server: ServerConfig,
}

impl TetherConfig {
    /// Load from `path`, else from the per-user config file if one exists,
    /// else defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match default_path().filter(|p| p.is_file()) {
                Some(path) => Self::from_file(&path),
                None => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tether").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tether.toml");
        std::fs::write(
            &path,
            r#"
[client]
base_url = "http://localhost:9000"

[provider]
repo_root = "/work/game"
identity = "alice"

[server]
bind_addr = "127.0.0.1:9091"
"#,
        )
        .unwrap();

        let config = TetherConfig::load(Some(&path)).unwrap();
        assert_eq!(config.client.base_url, "http://localhost:9000");
        assert_eq!(config.client.timeout_secs, 300);
        assert_eq!(config.provider.identity.as_deref(), Some("alice"));
        assert_eq!(config.provider.status_roots, vec!["Content".to_string(), "Config".to_string()]);
        assert_eq!(config.server.bind_addr.port(), 9091);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(TetherConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
