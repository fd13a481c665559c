use std::collections::BTreeSet;
use std::path::Path;
use std::sync::RwLock;

use tracing::{info, warn};

use crate::error::StatusResult;
use crate::git::GitRunner;

/// File extensions whose files are subject to exclusive locking.
///
/// Extensions are stored lowercase with their leading dot (`.uasset`).
#[derive(Debug, Default)]
pub struct LockableTypes {
    extensions: RwLock<BTreeSet<String>>,
}

impl LockableTypes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the registry from glob patterns such as `*.uasset`.
    pub fn from_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let types = Self::new();
        for pattern in patterns {
            types.register_pattern(pattern.as_ref());
        }
        types
    }

    pub fn register_pattern(&self, pattern: &str) {
        if let Some(extension) = extension_of_pattern(pattern) {
            self.extensions
                .write()
                .expect("lockable types lock poisoned")
                .insert(extension);
        }
    }

    pub fn is_lockable(&self, path: &Path) -> bool {
        let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        let key = format!(".{}", extension.to_ascii_lowercase());
        self.extensions
            .read()
            .expect("lockable types lock poisoned")
            .contains(&key)
    }

    pub fn extensions(&self) -> Vec<String> {
        self.extensions
            .read()
            .expect("lockable types lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Ask git which of `patterns` carry the `lockable` attribute and
    /// register those. Returns how many were registered.
    ///
    /// `git check-attr` answers one line per pattern, e.g.
    /// `*.uasset: lockable: set`.
    pub fn probe(&self, git: &dyn GitRunner, patterns: &[String]) -> StatusResult<usize> {
        let output = git
            .run("check-attr", &["lockable".to_string()], patterns)?
            .into_result("check-attr")?;

        let mut registered = 0;
        for line in &output.stdout {
            let mut parts = line.splitn(3, ": ");
            let (Some(pattern), Some(_attr), Some(value)) = (parts.next(), parts.next(), parts.next())
            else {
                warn!(line, "unexpected check-attr output");
                continue;
            };
            if value.trim().ends_with("set") && value.trim() != "unset" {
                self.register_pattern(pattern);
                registered += 1;
            }
        }
        info!(registered, extensions = ?self.extensions(), "probed lockable file types");
        Ok(registered)
    }
}

fn extension_of_pattern(pattern: &str) -> Option<String> {
    let trimmed = pattern.trim().trim_start_matches('*');
    if !trimmed.starts_with('.') || trimmed.len() < 2 {
        return None;
    }
    Some(trimmed.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::GitOutput;

    struct ScriptedGit(GitOutput);

    impl GitRunner for ScriptedGit {
        fn run(&self, command: &str, params: &[String], files: &[String]) -> StatusResult<GitOutput> {
            assert_eq!(command, "check-attr");
            assert_eq!(params, ["lockable".to_string()]);
            assert_eq!(files.len(), 3);
            Ok(self.0.clone())
        }
    }

    #[test]
    fn patterns_seed_extensions() {
        let types = LockableTypes::from_patterns(["*.uasset", "*.UMAP", "README"]);
        assert_eq!(types.extensions(), vec![".uasset".to_string(), ".umap".to_string()]);
        assert!(types.is_lockable(Path::new("/r/Content/Map.umap")));
        assert!(!types.is_lockable(Path::new("/r/Config/Default.ini")));
        assert!(!types.is_lockable(Path::new("/r/Makefile")));
    }

    #[test]
    fn probe_registers_set_attributes_only() {
        let git = ScriptedGit(GitOutput::stdout(&[
            "*.uasset: lockable: set",
            "*.umap: lockable: unspecified",
            "*.png: lockable: unset",
        ]));
        let types = LockableTypes::new();
        let patterns: Vec<String> = ["*.uasset", "*.umap", "*.png"].iter().map(|s| s.to_string()).collect();

        assert_eq!(types.probe(&git, &patterns).unwrap(), 1);
        assert_eq!(types.extensions(), vec![".uasset".to_string()]);
    }

    #[test]
    fn probe_failure_propagates() {
        let git = ScriptedGit(GitOutput { exit_code: 128, ..GitOutput::default() });
        let types = LockableTypes::new();
        let patterns: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        assert!(types.probe(&git, &patterns).is_err());
    }
}
