//! Repo path to display name translation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One translated path. `error` is empty on success.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FriendlyName {
    pub file_path: String,
    pub asset_name: String,
    pub error: String,
}

/// Turns asset file paths into names a person would recognise.
pub trait NameTranslator: Send + Sync {
    fn translate(&self, paths: &[String]) -> Vec<FriendlyName>;
}

/// Names each file by its stem. Relative paths resolve against `root`, and
/// files that do not exist are reported as errors.
#[derive(Clone, Debug)]
pub struct StemTranslator {
    root: PathBuf,
}

impl StemTranslator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn translate_one(&self, path: &str) -> FriendlyName {
        let mut name = FriendlyName { file_path: path.to_string(), ..FriendlyName::default() };
        let candidate = Path::new(path);
        let resolved = if candidate.is_absolute() { candidate.to_path_buf() } else { self.root.join(candidate) };

        if !resolved.is_file() {
            name.error = format!("Failed to find package for path {}", resolved.display());
            return name;
        }
        match resolved.file_stem() {
            Some(stem) => name.asset_name = stem.to_string_lossy().into_owned(),
            None => name.error = format!("No asset name in path {}", resolved.display()),
        }
        name
    }
}

impl NameTranslator for StemTranslator {
    fn translate(&self, paths: &[String]) -> Vec<FriendlyName> {
        paths.iter().map(|path| self.translate_one(path)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stems_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Content/Maps")).unwrap();
        std::fs::write(dir.path().join("Content/Maps/Arena.umap"), b"map").unwrap();

        let names = StemTranslator::new(dir.path()).translate(&["Content/Maps/Arena.umap".into()]);
        assert_eq!(names[0].asset_name, "Arena");
        assert!(names[0].error.is_empty());
        assert_eq!(names[0].file_path, "Content/Maps/Arena.umap");
    }

    #[test]
    fn missing_file_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let names = StemTranslator::new(dir.path()).translate(&["Content/__ExternalActors__/A1B2.uasset".into()]);
        assert!(names[0].asset_name.is_empty());
        assert!(names[0].error.starts_with("Failed to find package for path"));
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(FriendlyName {
            file_path: "a".into(),
            asset_name: "b".into(),
            error: String::new(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"filePath": "a", "assetName": "b", "error": ""}));
    }
}
