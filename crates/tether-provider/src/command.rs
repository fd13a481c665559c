use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::oneshot;
use uuid::Uuid;

use tether_cache::LockUpdate;
use tether_types::StateDelta;

use crate::error::{ProviderError, ProviderResult};
use crate::operation::{Concurrency, Operation};

pub type CommandId = Uuid;

/// Invoked once when a command is finalized, including when it was
/// cancelled.
pub type CompletionCallback = Box<dyn FnOnce(&CommandReport) + Send + 'static>;

/// What a worker produced. Nothing in here has touched the caches yet.
#[derive(Clone, Debug, Default)]
pub struct CommandOutcome {
    pub success: bool,
    pub info: Vec<String>,
    pub errors: Vec<String>,
    pub deltas: BTreeMap<PathBuf, StateDelta>,
    /// Paths to drop from the state cache before `deltas` are merged.
    pub removals: Vec<PathBuf>,
    pub lock_updates: Vec<LockUpdate>,
}

impl CommandOutcome {
    pub fn succeeded() -> Self {
        Self { success: true, ..Self::default() }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, errors: vec![error.into()], ..Self::default() }
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info.push(info.into());
        self
    }

    /// Record an error and mark the outcome failed.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.success = false;
        self.errors.push(error.into());
    }

    /// Fold deltas in. Axes from `deltas` win over ones already recorded.
    pub fn merge_deltas(&mut self, deltas: BTreeMap<PathBuf, StateDelta>) {
        for (path, delta) in deltas {
            self.merge_delta(path, &delta);
        }
    }

    pub fn merge_delta(&mut self, path: PathBuf, delta: &StateDelta) {
        self.deltas.entry(path).or_default().merge(delta);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CommandResult {
    Succeeded,
    Failed,
    Cancelled,
}

/// Final word on a command, handed to its callback.
#[derive(Clone, Debug, Serialize)]
pub struct CommandReport {
    pub id: CommandId,
    pub operation: String,
    pub files: Vec<PathBuf>,
    pub result: CommandResult,
    pub info: Vec<String>,
    pub errors: Vec<String>,
    /// Paths whose cached state changed when the command was merged.
    pub updated: Vec<PathBuf>,
}

impl CommandReport {
    pub(crate) fn new(command: &Command, result: CommandResult) -> Self {
        Self {
            id: command.id,
            operation: command.operation.name().to_string(),
            files: command.files.clone(),
            result,
            info: Vec::new(),
            errors: Vec::new(),
            updated: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == CommandResult::Succeeded
    }
}

/// Shared cancellation flag. Cancelling is cooperative: a worker already
/// inside a network call finishes, and its result is discarded at merge.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// An operation bound to its files, owned by the queue until finalized.
pub struct Command {
    pub id: CommandId,
    pub operation: Operation,
    pub files: Vec<PathBuf>,
    pub concurrency: Concurrency,
    cancel: CancelToken,
    callback: Option<CompletionCallback>,
}

impl Command {
    pub fn new(operation: Operation, files: Vec<PathBuf>, concurrency: Concurrency) -> Self {
        Self {
            id: Uuid::now_v7(),
            operation,
            files,
            concurrency,
            cancel: CancelToken::default(),
            callback: None,
        }
    }

    pub fn with_callback(mut self, callback: impl FnOnce(&CommandReport) + Send + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Consume the command, firing its callback.
    pub(crate) fn finish(self, report: &CommandReport) {
        if let Some(callback) = self.callback {
            callback(report);
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.id)
            .field("operation", &self.operation)
            .field("files", &self.files)
            .field("concurrency", &self.concurrency)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// The issuer's side of an asynchronous command.
#[derive(Debug)]
pub struct CommandHandle {
    id: CommandId,
    cancel: CancelToken,
    report: oneshot::Receiver<CommandReport>,
}

impl CommandHandle {
    pub(crate) fn new(id: CommandId, cancel: CancelToken, report: oneshot::Receiver<CommandReport>) -> Self {
        Self { id, cancel, report }
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The report, if the command has been finalized.
    pub fn try_report(&mut self) -> ProviderResult<Option<CommandReport>> {
        match self.report.try_recv() {
            Ok(report) => Ok(Some(report)),
            Err(oneshot::error::TryRecvError::Empty) => Ok(None),
            Err(oneshot::error::TryRecvError::Closed) => Err(ProviderError::Dropped(self.id)),
        }
    }

    /// Wait for the report. Something must be ticking the queue, normally
    /// the provider's scheduler task.
    pub async fn wait(self) -> ProviderResult<CommandReport> {
        self.report.await.map_err(|_| ProviderError::Dropped(self.id))
    }
}
