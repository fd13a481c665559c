//! HTTP client for the local lock and status daemon.
//!
//! Every request carries a nonce read from a token file on disk. A request
//! answered with 401 re-reads the token and is retried exactly once.
//!
//! # Key Types
//!
//! - [`RemoteServiceClient`]: High-level daemon API with a cached status snapshot
//! - [`Transport`]: Request/response seam; [`HttpTransport`] is the reqwest implementation
//! - [`NonceStore`]: Auth token loaded from the primary or legacy token file
//! - [`MockDaemon`]: In-memory daemon for tests and offline use

pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod mock;
pub mod token;
pub mod transport;
pub mod types;

pub use client::{RemoteServiceClient, StatusSnapshot};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use mock::MockDaemon;
pub use token::NonceStore;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, Transport};
pub use types::{FileHistory, FileRevision, LockAction, LockFailure, UserInfo};
