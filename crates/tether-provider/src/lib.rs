//! The revision-control provider: a serialized command queue over the
//! daemon client, the status reconciler, and the caches.
//!
//! Operations run as commands. A worker performs the I/O and returns a
//! [`CommandOutcome`]; the queue tick merges outcomes into the caches one
//! at a time, in issue order, and fires each command's callback.
//!
//! # Key Types
//!
//! - [`Provider`]: Owns the caches and the queue; issues, ticks and queries
//! - [`Operation`]: The ten operations a command can carry
//! - [`CommandQueue`]: FIFO of issued commands with a completion channel
//! - [`CommandReport`]: What a callback receives once a command is merged
//! - [`Refresher`]: Periodic forced status refresh

pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod operation;
pub mod provider;
pub mod queue;
pub mod refresher;
mod workers;

pub use command::{
    CancelToken, Command, CommandHandle, CommandId, CommandOutcome, CommandReport, CommandResult,
    CompletionCallback,
};
pub use config::ProviderConfig;
pub use error::{ProviderError, ProviderResult};
pub use event::ProviderEvent;
pub use operation::{CacheUsage, Concurrency, Operation};
pub use provider::Provider;
pub use queue::{CommandQueue, CommandState, Finished};
pub use refresher::Refresher;
