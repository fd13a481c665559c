//! One worker per operation.
//!
//! Workers may read the caches but never write them. Everything they learn
//! goes into a [`CommandOutcome`] that the queue tick merges later.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use tether_cache::{LockCache, LockUpdate, StateCache};
use tether_client::{LockAction, RemoteServiceClient, StatusSnapshot};
use tether_status::StatusReconciler;
use tether_types::{
    normalize_relative, relative_path, FileState, LockInfo, LockListing, LockState, StateDelta,
};

use crate::command::CommandOutcome;
use crate::operation::{Concurrency, Operation};

/// Everything a worker may touch. Cheap to clone.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub client: Arc<RemoteServiceClient>,
    pub reconciler: Arc<StatusReconciler>,
    pub lock_cache: Arc<LockCache>,
    pub state_cache: Arc<StateCache>,
    pub identity: String,
    pub status_roots: Vec<PathBuf>,
}

pub(crate) async fn execute(
    ctx: &WorkerContext,
    operation: &Operation,
    files: &[PathBuf],
    concurrency: Concurrency,
) -> CommandOutcome {
    let outcome = match operation {
        Operation::Connect => connect(ctx, concurrency).await,
        Operation::CheckOut => check_out(ctx, files).await,
        Operation::MarkForAdd => mark_for_add(ctx, files).await,
        Operation::Delete => delete(ctx, files).await,
        Operation::CheckIn { message } => check_in(ctx, message, files).await,
        Operation::Revert => revert(ctx, files).await,
        Operation::Fetch { update_status } => fetch(ctx, *update_status).await,
        Operation::UpdateStatus => update_status(ctx, files).await,
        Operation::Resolve => resolve(ctx, files).await,
        Operation::Copy { destination } => copy(ctx, destination).await,
    };
    for error in &outcome.errors {
        warn!(operation = operation.name(), error = %error, "worker reported an error");
    }
    outcome
}

// ----------------------------------------------------------------------
// Operations
// ----------------------------------------------------------------------

async fn connect(ctx: &WorkerContext, concurrency: Concurrency) -> CommandOutcome {
    match concurrency {
        Concurrency::Synchronous => CommandOutcome::succeeded().with_info("connectivity not verified"),
        Concurrency::Asynchronous => {
            if ctx.client.check_system_status().await {
                CommandOutcome::succeeded()
            } else {
                CommandOutcome::failed("Unable to connect to the tether daemon. Make sure it is running and try again.")
            }
        }
    }
}

async fn check_out(ctx: &WorkerContext, files: &[PathBuf]) -> CommandOutcome {
    let mut outcome = CommandOutcome::succeeded();
    lock_files(ctx, files, &mut outcome).await;
    outcome
}

async fn mark_for_add(ctx: &WorkerContext, files: &[PathBuf]) -> CommandOutcome {
    if files.is_empty() {
        return CommandOutcome::succeeded();
    }
    check_out(ctx, files).await
}

async fn delete(ctx: &WorkerContext, files: &[PathBuf]) -> CommandOutcome {
    let mut outcome = CommandOutcome::succeeded();
    if files.is_empty() {
        return outcome;
    }
    if !lock_files(ctx, files, &mut outcome).await {
        return outcome;
    }

    // Removed from disk directly: a staged removal would complicate the
    // file's tree state.
    let mut deleted = Vec::new();
    for file in files {
        match tokio::fs::remove_file(file).await {
            Ok(()) => deleted.push(file.clone()),
            Err(e) => outcome.fail(format!("Failed to delete {}: {e}", file.display())),
        }
    }

    follow_up_refresh(ctx, files, &mut outcome).await;
    let marker = StateDelta::new().with_file(FileState::Deleted);
    for file in deleted {
        outcome.merge_delta(file, &marker);
    }
    outcome
}

async fn check_in(ctx: &WorkerContext, message: &str, files: &[PathBuf]) -> CommandOutcome {
    let mut outcome = CommandOutcome::succeeded();
    let relative: Vec<String> = relative_files(ctx, files, &mut outcome).into_iter().map(|(_, r)| r).collect();

    info!(files = relative.len(), "submitting");
    if let Err(e) = ctx.client.submit(message, &relative).await {
        outcome.fail(format!("Failed to submit: {e}"));
        return outcome;
    }
    outcome.info.push("Commit successful!".into());

    // Submitted deletions need no further tracking.
    let (deleted, remaining): (Vec<PathBuf>, Vec<PathBuf>) =
        files.iter().cloned().partition(|file| ctx.state_cache.get(file).is_deleted());
    outcome.removals = deleted;
    follow_up_refresh(ctx, &remaining, &mut outcome).await;
    outcome
}

async fn revert(ctx: &WorkerContext, files: &[PathBuf]) -> CommandOutcome {
    let mut outcome = CommandOutcome::succeeded();

    // An empty list reverts everything the cache knows to be revertable.
    let files: Vec<PathBuf> = if files.is_empty() {
        ctx.state_cache.filter(|record| record.can_revert()).into_iter().map(|r| r.path).collect()
    } else {
        files.to_vec()
    };
    if files.is_empty() {
        return outcome.with_info("Nothing to revert");
    }

    let relative: Vec<String> = relative_files(ctx, &files, &mut outcome).into_iter().map(|(_, r)| r).collect();
    if let Err(e) = ctx.client.revert(&relative).await {
        outcome.fail(format!("Failed to revert: {e}"));
        return outcome;
    }

    let locked: Vec<PathBuf> = files
        .iter()
        .filter(|file| {
            ctx.state_cache.get(file).lock == Some(LockState::Locked)
                || ctx.lock_cache.owner(file).as_deref() == Some(ctx.identity.as_str())
        })
        .cloned()
        .collect();
    if !locked.is_empty() {
        unlock_reverted(ctx, &locked, &mut outcome).await;
    }

    follow_up_refresh(ctx, &files, &mut outcome).await;
    outcome
}

async fn fetch(ctx: &WorkerContext, update_status: bool) -> CommandOutcome {
    let mut outcome = CommandOutcome::succeeded();
    if !update_status {
        return outcome;
    }
    let roots = existing_roots(ctx);
    if let Err(error) = refresh(ctx, &roots, true, &mut outcome).await {
        outcome.fail(error);
    }
    outcome
}

async fn update_status(ctx: &WorkerContext, files: &[PathBuf]) -> CommandOutcome {
    let mut outcome = CommandOutcome::succeeded();
    let files = if files.is_empty() { existing_roots(ctx) } else { files.to_vec() };
    if let Err(error) = refresh(ctx, &files, false, &mut outcome).await {
        outcome.fail(error);
    }
    outcome
}

async fn resolve(ctx: &WorkerContext, files: &[PathBuf]) -> CommandOutcome {
    let mut outcome = CommandOutcome::succeeded();
    if files.is_empty() {
        return outcome;
    }

    let pairs = relative_files(ctx, files, &mut outcome);
    let relative: Vec<String> = pairs.iter().map(|(_, r)| r.clone()).collect();
    let reconciler = ctx.reconciler.clone();
    let added = match tokio::task::spawn_blocking(move || reconciler.git().run("add", &[], &relative)).await {
        Ok(Ok(output)) => {
            outcome.info.extend(output.info.iter().cloned());
            match output.into_result("add") {
                Ok(_) => pairs.into_iter().map(|(path, _)| path).collect(),
                Err(e) => {
                    outcome.fail(e.to_string());
                    Vec::new()
                }
            }
        }
        Ok(Err(e)) => {
            outcome.fail(e.to_string());
            Vec::new()
        }
        Err(e) => {
            outcome.fail(format!("git add aborted: {e}"));
            Vec::new()
        }
    };

    follow_up_refresh(ctx, files, &mut outcome).await;
    let resolved = StateDelta::new().with_file(FileState::Unknown);
    for path in added {
        outcome.merge_delta(path, &resolved);
    }
    outcome
}

async fn copy(ctx: &WorkerContext, destination: &Path) -> CommandOutcome {
    // The source is untouched. Locking the destination is what adds it.
    let mut outcome = CommandOutcome::succeeded();
    lock_files(ctx, &[destination.to_path_buf()], &mut outcome).await;
    outcome.success = true;
    outcome
}

// ----------------------------------------------------------------------
// Locking
// ----------------------------------------------------------------------

/// Lock the lockable subset of `files`. Paths the daemon did not name as
/// failures are recorded as locked by us. Returns `true` only if every
/// lockable file was locked.
async fn lock_files(ctx: &WorkerContext, files: &[PathBuf], outcome: &mut CommandOutcome) -> bool {
    let lockable: Vec<PathBuf> = files
        .iter()
        .filter(|file| ctx.reconciler.lockable().is_lockable(file))
        .cloned()
        .collect();
    if lockable.is_empty() {
        debug!(files = files.len(), "no lockable files to lock");
        return true;
    }

    let pairs = relative_files(ctx, &lockable, outcome);
    let relative: Vec<String> = pairs.iter().map(|(_, r)| r.clone()).collect();
    let failures = match ctx.client.lock_files(&relative, false).await {
        Ok(failures) => failures,
        Err(e) => {
            outcome.fail(format!("Failed to lock files: {e}"));
            return false;
        }
    };

    let failed: HashSet<String> = failures.iter().map(|f| normalize_relative(&f.path)).collect();
    for failure in &failures {
        outcome.errors.push(failure.message(LockAction::Lock));
    }
    let locked = LockInfo::new(LockState::Locked, ctx.identity.clone());
    for (path, relative) in pairs {
        if failed.contains(&relative) {
            continue;
        }
        outcome.lock_updates.push(LockUpdate::Add { path: path.clone(), owner: ctx.identity.clone() });
        outcome.merge_delta(path, &StateDelta::new().with_lock(locked.clone()));
    }

    if failures.is_empty() {
        true
    } else {
        outcome.success = false;
        false
    }
}

/// Best-effort unlock after a revert. Problems are reported as info.
async fn unlock_reverted(ctx: &WorkerContext, locked: &[PathBuf], outcome: &mut CommandOutcome) {
    let pairs = relative_files(ctx, locked, outcome);
    let relative: Vec<String> = pairs.iter().map(|(_, r)| r.clone()).collect();
    let failures = match ctx.client.unlock_files(&relative, false).await {
        Ok(failures) => failures,
        Err(e) => {
            warn!(error = %e, "unlock after revert failed");
            outcome.info.push(format!("Failed to unlock reverted files: {e}"));
            return;
        }
    };

    let failed: HashSet<String> = failures.iter().map(|f| normalize_relative(&f.path)).collect();
    for failure in &failures {
        outcome.info.push(failure.message(LockAction::Unlock));
    }
    let released = StateDelta::new().with_lock(LockInfo::not_locked());
    for (path, relative) in pairs {
        if !failed.contains(&relative) {
            outcome.lock_updates.push(LockUpdate::Remove { path: path.clone() });
            outcome.merge_delta(path, &released);
        }
    }
}

// ----------------------------------------------------------------------
// Status resolution
// ----------------------------------------------------------------------

/// Re-resolve `files` after a mutation. Failure to do so does not fail the
/// mutation itself.
async fn follow_up_refresh(ctx: &WorkerContext, files: &[PathBuf], outcome: &mut CommandOutcome) {
    if files.is_empty() {
        return;
    }
    if let Err(error) = refresh(ctx, files, false, outcome).await {
        outcome.info.push(error);
    }
}

/// Expand `files`, classify them against the repository status, and merge
/// the deltas into `outcome`.
///
/// When the status cannot be fetched, lock-only deltas are still produced
/// from the in-memory lock listing, and the error is returned.
async fn refresh(
    ctx: &WorkerContext,
    files: &[PathBuf],
    force: bool,
    outcome: &mut CommandOutcome,
) -> Result<(), String> {
    let reconciler = ctx.reconciler.clone();
    let requested = files.to_vec();
    let candidates = match tokio::task::spawn_blocking(move || reconciler.expand(&requested)).await {
        Ok(Ok(candidates)) => candidates,
        Ok(Err(e)) => return Err(format!("Failed to list files: {e}")),
        Err(e) => return Err(format!("file listing aborted: {e}")),
    };
    if candidates.is_empty() {
        debug!(requested = files.len(), "no repository files to resolve");
        return Ok(());
    }

    let snapshot = match ctx.client.get_status(force).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            let listing = lock_listing(ctx, None, force, outcome);
            let deltas = ctx.reconciler.resolve_locks(&listing, &ctx.identity, &candidates);
            outcome.merge_deltas(deltas);
            return Err(format!("Failed to fetch repository status: {e}"));
        }
    };

    let listing = lock_listing(ctx, Some(&snapshot), force, outcome);
    let reconciler = ctx.reconciler.clone();
    let identity = ctx.identity.clone();
    let status = snapshot.status.clone();
    let deltas = tokio::task::spawn_blocking(move || reconciler.reconcile(&status, &listing, &identity, &candidates))
        .await
        .map_err(|e| format!("status reconciliation aborted: {e}"))?;
    debug!(files = deltas.len(), force, "resolved file states");
    outcome.merge_deltas(deltas);
    Ok(())
}

/// The lock listing to classify against.
///
/// A forced refresh, or a stale lock cache, rebuilds the listing from the
/// status snapshot and queues it as the new authoritative tier. Otherwise
/// the cache's effective listing is used. Lock changes this command already
/// made are applied on top either way.
fn lock_listing(
    ctx: &WorkerContext,
    snapshot: Option<&StatusSnapshot>,
    force: bool,
    outcome: &mut CommandOutcome,
) -> LockListing {
    let mut listing = match snapshot {
        Some(snapshot) if force || ctx.lock_cache.is_stale(Instant::now()) => {
            let fresh = LockListing::from_status(ctx.reconciler.repo_root(), &snapshot.status);
            let merged = ctx.lock_cache.preview(&fresh, snapshot.fetched_at);
            outcome.lock_updates.push(LockUpdate::Replace { listing: fresh, as_of: snapshot.fetched_at });
            merged
        }
        _ => ctx.lock_cache.snapshot(),
    };
    for update in &outcome.lock_updates {
        match update {
            LockUpdate::Add { path, owner } => {
                listing.insert(path.clone(), owner.clone());
            }
            LockUpdate::Remove { path } => {
                listing.remove(path);
            }
            LockUpdate::Replace { .. } => {}
        }
    }
    listing
}

// ----------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------

/// Pair each file with its repo-relative path. Files outside the
/// repository are skipped with an info message.
fn relative_files(ctx: &WorkerContext, files: &[PathBuf], outcome: &mut CommandOutcome) -> Vec<(PathBuf, String)> {
    let root = ctx.reconciler.repo_root();
    files
        .iter()
        .filter_map(|file| match relative_path(root, file) {
            Ok(relative) => Some((file.clone(), relative)),
            Err(e) => {
                outcome.info.push(e.to_string());
                None
            }
        })
        .collect()
}

fn existing_roots(ctx: &WorkerContext) -> Vec<PathBuf> {
    ctx.status_roots.iter().filter(|root| root.exists()).cloned().collect()
}
