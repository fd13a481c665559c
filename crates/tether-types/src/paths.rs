//! Conversions between absolute working-copy paths and the repo-relative,
//! `/`-separated form the daemon speaks.

use std::path::{Component, Path, PathBuf};

use crate::error::{TypeError, TypeResult};

/// Express `path` relative to `root` using `/` separators.
pub fn relative_path(root: &Path, path: &Path) -> TypeResult<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| TypeError::OutsideRepository {
            path: path.to_path_buf(),
            root: root.to_path_buf(),
        })?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = part
                    .to_str()
                    .ok_or_else(|| TypeError::NonUtf8Path(path.to_path_buf()))?;
                parts.push(part);
            }
            Component::CurDir => {}
            _ => {
                return Err(TypeError::OutsideRepository {
                    path: path.to_path_buf(),
                    root: root.to_path_buf(),
                })
            }
        }
    }
    Ok(parts.join("/"))
}

/// Resolve a daemon-style relative path against `root`.
pub fn absolute_path(root: &Path, relative: &str) -> PathBuf {
    let normalized = normalize_relative(relative);
    let mut path = root.to_path_buf();
    for part in normalized.split('/').filter(|p| !p.is_empty()) {
        path.push(part);
    }
    path
}

/// Normalize separators and strip leading `./` or `/`.
pub fn normalize_relative(relative: &str) -> String {
    let unified = relative.replace('\\', "/");
    let mut trimmed = unified.as_str();
    loop {
        if let Some(rest) = trimmed.strip_prefix("./") {
            trimmed = rest;
        } else if let Some(rest) = trimmed.strip_prefix('/') {
            trimmed = rest;
        } else {
            break;
        }
    }
    trimmed.to_string()
}
