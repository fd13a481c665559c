use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("failed to launch git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("git {command} failed with exit code {code}: {stderr}")]
    Git { command: String, code: i32, stderr: String },

    #[error("path error: {0}")]
    Path(#[from] tether_types::TypeError),
}

pub type StatusResult<T> = Result<T, StatusError>;
