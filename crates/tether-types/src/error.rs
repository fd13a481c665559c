use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("path {path} is outside repository {root}")]
    OutsideRepository { path: PathBuf, root: PathBuf },

    #[error("path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),
}

pub type TypeResult<T> = Result<T, TypeError>;
