use std::path::Path;

use crate::error::{CacheError, CacheResult};

/// Flips a file's read-only flag to mirror lock ownership.
pub trait FileAttributes: Send + Sync {
    fn set_read_only(&self, path: &Path, read_only: bool) -> CacheResult<()>;
}

/// Applies the flag on the real filesystem. Missing files are ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsAttributes;

impl FileAttributes for FsAttributes {
    fn set_read_only(&self, path: &Path, read_only: bool) -> CacheResult<()> {
        let permission_error = |source| CacheError::Permission { path: path.to_path_buf(), source };
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(permission_error(e)),
        };
        let mut permissions = metadata.permissions();
        if permissions.readonly() == read_only {
            return Ok(());
        }
        permissions.set_readonly(read_only);
        std::fs::set_permissions(path, permissions).map_err(permission_error)
    }
}

/// Leaves files untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAttributes;

impl FileAttributes for NoopAttributes {
    fn set_read_only(&self, _path: &Path, _read_only: bool) -> CacheResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggles_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("A.uasset");
        std::fs::write(&path, b"x").unwrap();

        FsAttributes.set_read_only(&path, true).unwrap();
        assert!(std::fs::metadata(&path).unwrap().permissions().readonly());

        FsAttributes.set_read_only(&path, false).unwrap();
        assert!(!std::fs::metadata(&path).unwrap().permissions().readonly());
    }

    #[test]
    fn missing_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FsAttributes.set_read_only(&dir.path().join("nope"), true).is_ok());
    }
}
