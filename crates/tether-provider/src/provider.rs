use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, TryLockError};

use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use tether_cache::{FileAttributes, FsAttributes, LockCache, StateCache};
use tether_client::{ClientConfig, RemoteServiceClient};
use tether_status::{GitRunner, LockableTypes, StatusReconciler, SystemGit};
use tether_types::{FileRecord, LockInfo, LockState, StateDelta};

use crate::command::{
    Command, CommandHandle, CommandId, CommandOutcome, CommandReport, CommandResult, CompletionCallback,
};
use crate::config::ProviderConfig;
use crate::error::ProviderResult;
use crate::event::ProviderEvent;
use crate::operation::{CacheUsage, Concurrency, Operation};
use crate::queue::{CommandQueue, CommandState, Finished};
use crate::workers::{self, WorkerContext};

/// The revision-control provider: owns the caches, the daemon client and
/// the command queue.
///
/// Construct one per working copy and share it behind an `Arc`. The state
/// and lock caches are only written from [`Provider::tick`], which runs on
/// whichever task currently holds the tick guard.
pub struct Provider {
    config: ProviderConfig,
    client: Arc<RemoteServiceClient>,
    reconciler: Arc<StatusReconciler>,
    lock_cache: Arc<LockCache>,
    state_cache: Arc<StateCache>,
    queue: Arc<CommandQueue>,
    identity: RwLock<String>,
    enabled: AtomicBool,
    events: broadcast::Sender<ProviderEvent>,
    last_errors: RwLock<Vec<String>>,
    tick_guard: Mutex<()>,
}

impl Provider {
    pub fn new(
        config: ProviderConfig,
        client: Arc<RemoteServiceClient>,
        git: Arc<dyn GitRunner>,
        attributes: Arc<dyn FileAttributes>,
    ) -> Self {
        let identity = config.identity.clone().unwrap_or_default();
        let reconciler = StatusReconciler::new(config.repo_root.clone(), Arc::new(LockableTypes::new()), git);
        let lock_cache = LockCache::new(identity.clone(), config.lock_ttl(), attributes);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            client,
            reconciler: Arc::new(reconciler),
            lock_cache: Arc::new(lock_cache),
            state_cache: Arc::new(StateCache::new()),
            queue: Arc::new(CommandQueue::new()),
            identity: RwLock::new(identity),
            enabled: AtomicBool::new(false),
            events,
            last_errors: RwLock::new(Vec::new()),
            tick_guard: Mutex::new(()),
            config,
        }
    }

    /// A provider talking HTTP to the daemon and running the system `git`.
    pub fn from_config(config: ProviderConfig, client_config: &ClientConfig) -> ProviderResult<Self> {
        let client = Arc::new(RemoteServiceClient::new(client_config)?);
        let git = Arc::new(SystemGit::new(config.repo_root.clone()));
        Ok(Self::new(config, client, git, Arc::new(FsAttributes)))
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Resolve the identity, probe lockable types, and run the first forced
    /// status pass. Operations other than `Connect` are rejected until this
    /// has run.
    pub async fn initialize(&self) -> ProviderResult<()> {
        let identity = match &self.config.identity {
            Some(identity) => identity.clone(),
            None => match self.client.user_info().await {
                Ok(user) => user.username,
                Err(e) => {
                    warn!(error = %e, "cannot resolve lock identity from the daemon");
                    String::new()
                }
            },
        };
        if identity.is_empty() {
            warn!("no lock identity available; every lock will look foreign");
        }
        self.set_identity(identity.clone());

        let reconciler = self.reconciler.clone();
        let patterns = self.config.lockable_patterns.clone();
        let probed =
            tokio::task::spawn_blocking(move || reconciler.lockable().probe(reconciler.git(), &patterns)).await;
        match probed {
            Ok(Ok(registered)) => debug!(registered, "lockable types probed"),
            Ok(Err(e)) => {
                warn!(error = %e, "lockable probe failed, using configured patterns");
                self.seed_lockable_types();
            }
            Err(e) => {
                warn!(error = %e, "lockable probe aborted, using configured patterns");
                self.seed_lockable_types();
            }
        }

        self.enabled.store(true, Ordering::SeqCst);
        info!(identity = %identity, root = %self.config.repo_root.display(), "provider enabled");

        let report = self.execute(Operation::Fetch { update_status: true }, Vec::new()).await?;
        if !report.is_success() {
            warn!(errors = ?report.errors, "initial status pass failed");
        }
        Ok(())
    }

    fn seed_lockable_types(&self) {
        for pattern in &self.config.lockable_patterns {
            self.reconciler.lockable().register_pattern(pattern);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Stop accepting operations other than `Connect`.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn identity(&self) -> String {
        self.identity.read().expect("identity lock poisoned").clone()
    }

    pub fn set_identity(&self, identity: impl Into<String>) {
        let identity = identity.into();
        self.lock_cache.set_identity(identity.clone());
        *self.identity.write().expect("identity lock poisoned") = identity;
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn client(&self) -> &Arc<RemoteServiceClient> {
        &self.client
    }

    pub fn lock_cache(&self) -> &LockCache {
        &self.lock_cache
    }

    pub fn state_cache(&self) -> &StateCache {
        &self.state_cache
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    // ------------------------------------------------------------------
    // Issuing commands
    // ------------------------------------------------------------------

    /// Run an operation synchronously: the worker runs on the calling task,
    /// which then ticks the queue until the command is finalized.
    pub async fn execute(&self, operation: Operation, files: Vec<PathBuf>) -> ProviderResult<CommandReport> {
        self.execute_with(operation, files, None).await
    }

    pub async fn execute_with(
        &self,
        operation: Operation,
        files: Vec<PathBuf>,
        callback: Option<CompletionCallback>,
    ) -> ProviderResult<CommandReport> {
        let (command, mut handle) = self.prepare(operation, files, Concurrency::Synchronous, callback);
        if let Some(command) = self.admit(command) {
            let (id, operation, files) = (command.id, command.operation.clone(), command.files.clone());
            self.queue.push(command);
            self.queue.start(id);
            let outcome = workers::execute(&self.worker_context(), &operation, &files, Concurrency::Synchronous).await;
            self.queue.complete(id, outcome);
        }

        loop {
            self.tick();
            if let Some(report) = handle.try_report()? {
                return Ok(report);
            }
            tokio::time::sleep(self.config.sync_poll_interval()).await;
        }
    }

    /// Issue an operation asynchronously. The worker runs on its own task
    /// and the report arrives once a later tick finalizes the command.
    pub fn issue(&self, operation: Operation, files: Vec<PathBuf>) -> CommandHandle {
        self.issue_with(operation, files, None)
    }

    pub fn issue_with(
        &self,
        operation: Operation,
        files: Vec<PathBuf>,
        callback: Option<CompletionCallback>,
    ) -> CommandHandle {
        let (command, handle) = self.prepare(operation, files, Concurrency::Asynchronous, callback);
        let Some(command) = self.admit(command) else {
            return handle;
        };

        let (id, operation, files) = (command.id, command.operation.clone(), command.files.clone());
        self.queue.push(command);
        self.queue.start(id);

        let ctx = self.worker_context();
        let queue = self.queue.clone();
        tokio::spawn(async move {
            let work = tokio::spawn(async move {
                workers::execute(&ctx, &operation, &files, Concurrency::Asynchronous).await
            });
            let outcome = match work.await {
                Ok(outcome) => outcome,
                Err(e) => CommandOutcome::failed(format!("worker aborted: {e}")),
            };
            queue.complete(id, outcome);
        });
        handle
    }

    /// Cancel a queued command. Its result, if any, is discarded.
    pub fn cancel(&self, id: CommandId) -> bool {
        let cancelled = self.queue.cancel(id);
        if cancelled {
            info!(%id, "command cancelled");
        }
        cancelled
    }

    pub fn is_pending(&self, id: CommandId) -> bool {
        self.queue.contains(id)
    }

    pub fn command_state(&self, id: CommandId) -> Option<CommandState> {
        self.queue.state_of(id)
    }

    /// Queued commands in issue order.
    pub fn pending_commands(&self) -> Vec<(CommandId, &'static str)> {
        self.queue.pending()
    }

    fn prepare(
        &self,
        operation: Operation,
        files: Vec<PathBuf>,
        concurrency: Concurrency,
        callback: Option<CompletionCallback>,
    ) -> (Command, CommandHandle) {
        let operation = match operation {
            Operation::Copy { destination } => Operation::Copy { destination: self.reconciler.absolutize(&destination) },
            other => other,
        };
        let files = files.iter().map(|file| self.reconciler.absolutize(file)).collect();

        let (sender, receiver) = oneshot::channel();
        let command = Command::new(operation, files, concurrency).with_callback(move |report| {
            if let Some(callback) = callback {
                callback(report);
            }
            // The issuer may have stopped waiting.
            let _ = sender.send(report.clone());
        });
        info!(
            id = %command.id,
            operation = %command.operation,
            files = command.files.len(),
            ?concurrency,
            "command issued"
        );
        let handle = CommandHandle::new(command.id, command.cancel_token(), receiver);
        (command, handle)
    }

    /// Reject everything but `Connect` while disabled.
    fn admit(&self, command: Command) -> Option<Command> {
        if self.is_enabled() || command.operation == Operation::Connect {
            return Some(command);
        }
        let message = format!(
            "Operation '{}' not supported by revision control provider 'tether'",
            command.operation.name()
        );
        error!(operation = %command.operation, "{message}");
        let mut report = CommandReport::new(&command, CommandResult::Failed);
        report.errors.push(message);
        self.record_failure(&report);
        command.finish(&report);
        None
    }

    fn worker_context(&self) -> WorkerContext {
        WorkerContext {
            client: self.client.clone(),
            reconciler: self.reconciler.clone(),
            lock_cache: self.lock_cache.clone(),
            state_cache: self.state_cache.clone(),
            identity: self.identity(),
            status_roots: self.config.status_root_paths(),
        }
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Finalize at most one command. Returns `true` if one was finalized.
    ///
    /// If another task is already ticking, this returns `false` at once.
    pub fn tick(&self) -> bool {
        let (command, report) = {
            let _guard = match self.tick_guard.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::WouldBlock) => return false,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            };
            let Some(finished) = self.queue.pop_finished() else {
                return false;
            };
            self.finalize(finished)
        };
        // Outside the guard, so callbacks may issue and even execute
        // further commands.
        command.finish(&report);
        true
    }

    fn finalize(&self, finished: Finished) -> (Command, CommandReport) {
        let (command, outcome) = match finished {
            Finished::Cancelled(command) => {
                info!(id = %command.id, operation = %command.operation, "cancelled command finalized");
                let mut report = CommandReport::new(&command, CommandResult::Cancelled);
                report.info.push("Operation cancelled".into());
                return (command, report);
            }
            Finished::Completed(command, outcome) => (command, outcome),
        };

        let identity = self.identity();
        let CommandOutcome { success, info, errors, mut deltas, removals, lock_updates } = outcome;

        for update in lock_updates {
            self.lock_cache.apply(update);
        }
        self.settle_lock_axis(&mut deltas, &identity);

        let mut changed = BTreeSet::new();
        for path in &removals {
            if self.state_cache.remove(path) {
                changed.insert(path.clone());
            }
        }
        changed.extend(self.state_cache.apply(&deltas, &identity));

        let result = if success { CommandResult::Succeeded } else { CommandResult::Failed };
        let mut report = CommandReport::new(&command, result);
        report.info = info;
        report.errors = errors;
        report.updated = changed.into_iter().collect();

        if !report.updated.is_empty() {
            self.emit(ProviderEvent::StateChanged { paths: report.updated.clone() });
        }
        if success {
            debug!(id = %command.id, operation = %command.operation, updated = report.updated.len(), "command finalized");
        } else {
            error!(
                id = %command.id,
                operation = %command.operation,
                errors = ?report.errors,
                "command failed"
            );
            self.record_failure(&report);
        }
        (command, report)
    }

    /// Lock deltas are re-derived from the lock cache as it stands at merge
    /// time, so a listing fetched before an earlier lock was merged cannot
    /// undo it.
    fn settle_lock_axis(&self, deltas: &mut BTreeMap<PathBuf, StateDelta>, identity: &str) {
        for (path, delta) in deltas.iter_mut() {
            let Some(lock) = &delta.lock else { continue };
            if lock.state == LockState::Unlockable {
                continue;
            }
            delta.lock = Some(match self.lock_cache.owner(path) {
                Some(owner) => LockInfo::owned_by(&owner, identity),
                None => LockInfo::not_locked(),
            });
        }
    }

    fn record_failure(&self, report: &CommandReport) {
        *self.last_errors.write().expect("last errors lock poisoned") = report.errors.clone();
        self.emit(ProviderEvent::OperationFailed {
            operation: report.operation.clone(),
            paths: report.files.clone(),
            errors: report.errors.clone(),
        });
    }

    fn emit(&self, event: ProviderEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Tick until shutdown is signalled, sleeping until a worker completes
    /// or a command is cancelled.
    pub async fn run_scheduler(&self, mut shutdown: watch::Receiver<bool>) {
        info!("command scheduler started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            if self.tick() {
                tokio::task::yield_now().await;
                continue;
            }
            tokio::select! {
                _ = self.queue.notified() => {}
                _ = tokio::time::sleep(self.config.sync_poll_interval()) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("command scheduler stopped");
    }

    pub fn spawn_scheduler(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let provider = Arc::clone(self);
        tokio::spawn(async move { provider.run_scheduler(shutdown).await })
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Cached state for `paths`. With [`CacheUsage::ForceUpdate`], paths not
    /// merged since the last forced query are re-resolved first.
    pub async fn state(&self, paths: &[PathBuf], usage: CacheUsage) -> ProviderResult<Vec<FileRecord>> {
        let paths: Vec<PathBuf> = paths.iter().map(|path| self.reconciler.absolutize(path)).collect();
        if usage == CacheUsage::ForceUpdate {
            let stale: Vec<PathBuf> = paths
                .iter()
                .filter(|path| !self.state_cache.take_recently_refreshed(path))
                .cloned()
                .collect();
            if !stale.is_empty() {
                let report = self.execute(Operation::UpdateStatus, stale).await?;
                if !report.is_success() {
                    debug!(errors = ?report.errors, "forced state update failed");
                }
            }
        }
        Ok(paths.iter().map(|path| self.state_cache.get(path)).collect())
    }

    /// Cached state for one path, without any I/O.
    pub fn cached_state(&self, path: &Path) -> FileRecord {
        self.state_cache.get(&self.reconciler.absolutize(path))
    }

    pub fn records(&self) -> Vec<FileRecord> {
        self.state_cache.records()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }

    /// Errors of the most recently failed command.
    pub fn last_errors(&self) -> Vec<String> {
        self.last_errors.read().expect("last errors lock poisoned").clone()
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("repo_root", &self.config.repo_root)
            .field("identity", &self.identity())
            .field("enabled", &self.is_enabled())
            .field("queued", &self.queue.len())
            .finish_non_exhaustive()
    }
}
