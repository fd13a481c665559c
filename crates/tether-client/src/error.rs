use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no response from {path}: {message}")]
    Transport { path: String, message: String },

    #[error("request to {0} was denied after refreshing the auth token")]
    Unauthorized(String),

    #[error("{path} returned HTTP {code}: {body}")]
    Status { path: String, code: u16, body: String },

    #[error("failed to decode response from {path}: {message}")]
    Decode { path: String, message: String },

    #[error("client configuration error: {0}")]
    Config(String),
}

pub type ClientResult<T> = Result<T, ClientError>;
