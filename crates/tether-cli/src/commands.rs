use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use tether_client::RemoteServiceClient;
use tether_provider::{
    CacheUsage, CommandReport, Operation, Provider, ProviderEvent, Refresher,
};
use tether_server::{StemTranslator, TetherServer};
use tether_types::{relative_path, EffectiveState, FileRecord};

use crate::cli::*;
use crate::config::TetherConfig;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let mut config = TetherConfig::load(cli.config.as_deref())?;
    if let Some(repo) = &cli.repo {
        config.provider.repo_root = repo.clone();
    }
    config.provider.repo_root = std::path::absolute(&config.provider.repo_root)
        .with_context(|| format!("resolving {}", config.provider.repo_root.display()))?;
    let out = Output { format: cli.format, root: config.provider.repo_root.clone() };

    match cli.command {
        Command::Connect => cmd_connect(&config, &out).await,
        Command::Status(args) => cmd_status(&config, &out, args).await,
        Command::Lock(args) => run_operation(&config, &out, Operation::CheckOut, args.paths).await,
        Command::Add(args) => run_operation(&config, &out, Operation::MarkForAdd, args.paths).await,
        Command::Delete(args) => run_operation(&config, &out, Operation::Delete, args.paths).await,
        Command::Submit(args) => {
            run_operation(&config, &out, Operation::CheckIn { message: args.message }, args.paths).await
        }
        Command::Revert(args) => run_operation(&config, &out, Operation::Revert, args.paths).await,
        Command::Fetch(args) => {
            run_operation(&config, &out, Operation::Fetch { update_status: !args.no_status }, Vec::new()).await
        }
        Command::Resolve(args) => run_operation(&config, &out, Operation::Resolve, args.paths).await,
        Command::Copy(args) => {
            run_operation(&config, &out, Operation::Copy { destination: args.destination }, vec![args.source]).await
        }
        Command::History(args) => cmd_history(&config, &out, args).await,
        Command::Diff => cmd_diff(&config, &out).await,
        Command::Serve => cmd_serve(&config).await,
        Command::Watch => cmd_watch(&config, &out).await,
    }
}

/// A provider with its scheduler running.
struct Session {
    provider: Arc<Provider>,
    shutdown: watch::Sender<bool>,
    scheduler: JoinHandle<()>,
}

impl Session {
    async fn start(config: &TetherConfig, initialize: bool) -> anyhow::Result<Self> {
        let provider = Provider::from_config(config.provider.clone(), &config.client)
            .context("creating provider")?;
        let provider = Arc::new(provider);
        if initialize {
            provider.initialize().await.context("initializing provider")?;
        }
        let (shutdown, rx) = watch::channel(false);
        let scheduler = provider.spawn_scheduler(rx);
        Ok(Self { provider, shutdown, scheduler })
    }

    async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.scheduler.await {
            warn!(error = %e, "scheduler task ended abnormally");
        }
    }
}

async fn cmd_connect(config: &TetherConfig, out: &Output) -> anyhow::Result<()> {
    let session = Session::start(config, false).await?;
    let report = session.provider.issue(Operation::Connect, Vec::new()).wait().await?;
    session.stop().await;
    out.report(&report)
}

async fn cmd_status(config: &TetherConfig, out: &Output, args: StatusArgs) -> anyhow::Result<()> {
    let session = Session::start(config, true).await?;
    let records = if args.paths.is_empty() {
        session.provider.records()
    } else {
        let usage = if args.cached { CacheUsage::Use } else { CacheUsage::ForceUpdate };
        session.provider.state(&args.paths, usage).await?
    };
    session.stop().await;
    out.records(&records)
}

async fn run_operation(
    config: &TetherConfig,
    out: &Output,
    operation: Operation,
    paths: Vec<PathBuf>,
) -> anyhow::Result<()> {
    let session = Session::start(config, true).await?;
    let report = session.provider.execute(operation, paths).await?;
    session.stop().await;
    out.report(&report)
}

async fn cmd_history(config: &TetherConfig, out: &Output, args: HistoryArgs) -> anyhow::Result<()> {
    let client = RemoteServiceClient::new(&config.client)?;
    let path = out.relative(&args.path);
    let history = client.file_history(&path).await?;
    if out.format == OutputFormat::Json {
        return print_json(&history);
    }
    if history.revisions.is_empty() {
        println!("No history for {}", path.bold());
    }
    for revision in &history.revisions {
        println!(
            "{} {} {} {}",
            format!("#{}", revision.revision_number).yellow(),
            revision.short_commit_id.dimmed(),
            revision.user_name.cyan(),
            revision.description
        );
        println!("    {} {}", revision.action, revision.date.dimmed());
    }
    Ok(())
}

async fn cmd_diff(config: &TetherConfig, out: &Output) -> anyhow::Result<()> {
    let client = RemoteServiceClient::new(&config.client)?;
    let files = client.diff().await?;
    if out.format == OutputFormat::Json {
        return print_json(&files);
    }
    if files.is_empty() {
        println!("No changes.");
    }
    for file in &files {
        println!("  {} {}", "modified:".yellow(), file);
    }
    Ok(())
}

async fn cmd_serve(config: &TetherConfig) -> anyhow::Result<()> {
    let client = Arc::new(RemoteServiceClient::new(&config.client)?);
    let translator = Arc::new(StemTranslator::new(config.provider.repo_root.clone()));
    let server = TetherServer::new(config.server.clone(), client, translator);
    println!("tether server on {}", config.server.bind_addr.to_string().bold());
    server.serve(ctrl_c()).await?;
    Ok(())
}

async fn cmd_watch(config: &TetherConfig, out: &Output) -> anyhow::Result<()> {
    let session = Session::start(config, true).await?;
    let provider = session.provider.clone();
    let mut events = provider.subscribe();

    let refresher = Refresher::new(provider.clone()).spawn(session.shutdown.subscribe());
    let translator = Arc::new(StemTranslator::new(config.provider.repo_root.clone()));
    let server = TetherServer::new(config.server.clone(), provider.client().clone(), translator);
    let mut server_shutdown = session.shutdown.subscribe();
    let server = tokio::spawn(server.serve(async move {
        let _ = server_shutdown.changed().await;
    }));

    out.records(&provider.records())?;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => out.event(&provider, &event)?,
                Err(broadcast::error::RecvError::Lagged(missed)) => debug!(missed, "event stream lagged"),
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = ctrl_c() => break,
        }
    }

    session.stop().await;
    if let Err(e) = refresher.await {
        warn!(error = %e, "refresher task ended abnormally");
    }
    match server.await {
        Ok(result) => result?,
        Err(e) => warn!(error = %e, "server task ended abnormally"),
    }
    Ok(())
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

// ----------------------------------------------------------------------
// Output
// ----------------------------------------------------------------------

struct Output {
    format: OutputFormat,
    root: PathBuf,
}

impl Output {
    fn relative(&self, path: &Path) -> String {
        let absolute = if path.is_absolute() { path.to_path_buf() } else { self.root.join(path) };
        relative_path(&self.root, &absolute).unwrap_or_else(|_| path.display().to_string())
    }

    /// Print a command report. A failed command makes the process fail.
    fn report(&self, report: &CommandReport) -> anyhow::Result<()> {
        if self.format == OutputFormat::Json {
            print_json(report)?;
        } else {
            let mark = if report.is_success() { "✓".green().bold() } else { "✗".red().bold() };
            println!("{} {} ({:?})", mark, report.operation.bold(), report.result);
            for path in &report.updated {
                println!("  {} {}", "updated:".cyan(), self.relative(path));
            }
            for line in &report.info {
                println!("  {}", line.dimmed());
            }
            for line in &report.errors {
                println!("  {} {}", "error:".red(), line);
            }
        }
        if report.is_success() {
            Ok(())
        } else {
            anyhow::bail!("{} did not succeed", report.operation)
        }
    }

    fn records(&self, records: &[FileRecord]) -> anyhow::Result<()> {
        if self.format == OutputFormat::Json {
            return print_json(&records);
        }
        if records.is_empty() {
            println!("No tracked files.");
        }
        for record in records {
            println!("{}", self.record_line(record));
        }
        Ok(())
    }

    fn record_line(&self, record: &FileRecord) -> String {
        let state = record.effective_state();
        let label = format!("{state:?}");
        let label = match state {
            EffectiveState::NotAtHead | EffectiveState::LockedOther | EffectiveState::Unmerged => label.red(),
            EffectiveState::CheckedOut | EffectiveState::Added => label.green(),
            EffectiveState::Modified | EffectiveState::Deleted | EffectiveState::NotLatest => label.yellow(),
            _ => label.normal(),
        };
        let mut line = format!("{:<12} {}", label, self.relative(&record.path));
        if !record.lock_user.is_empty() {
            line.push_str(&format!(" {}", format!("[{}]", record.lock_user).cyan()));
        }
        line
    }

    fn event(&self, provider: &Provider, event: &ProviderEvent) -> anyhow::Result<()> {
        if self.format == OutputFormat::Json {
            return print_json(event);
        }
        match event {
            ProviderEvent::StateChanged { paths } => {
                for path in paths {
                    println!("{}", self.record_line(&provider.cached_state(path)));
                }
            }
            ProviderEvent::OperationFailed { operation, errors, .. } => {
                println!("{} {}", "✗".red().bold(), operation.bold());
                for error in errors {
                    println!("  {} {}", "error:".red(), error);
                }
            }
        }
        Ok(())
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_types::{LockState, TreeState};

    fn output(root: &Path) -> Output {
        Output { format: OutputFormat::Text, root: root.to_path_buf() }
    }

    #[test]
    fn relative_paths_inside_root() {
        let out = output(Path::new("/work/game"));
        assert_eq!(out.relative(Path::new("/work/game/Content/A.uasset")), "Content/A.uasset");
        assert_eq!(out.relative(Path::new("Content/B.uasset")), "Content/B.uasset");
        assert_eq!(out.relative(Path::new("/elsewhere/C.uasset")), "/elsewhere/C.uasset");
    }

    #[test]
    fn record_line_names_lock_owner() {
        colored::control::set_override(false);
        let out = output(Path::new("/work/game"));
        let mut record = FileRecord::new("/work/game/Content/A.uasset");
        record.tree = Some(TreeState::Unmodified);
        record.lock = Some(LockState::LockedOther);
        record.lock_user = "bob".into();

        let line = out.record_line(&record);
        assert!(line.starts_with("LockedOther"));
        assert!(line.contains("Content/A.uasset"));
        assert!(line.ends_with("[bob]"));
    }
}
