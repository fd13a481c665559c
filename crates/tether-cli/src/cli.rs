use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tether",
    about = "tether: file locking and status for large binary assets",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Working copy root, overriding the configuration
    #[arg(short = 'C', long, global = true)]
    pub repo: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check that the daemon is reachable
    Connect,
    /// Show file states
    Status(StatusArgs),
    /// Lock files for editing
    Lock(PathsArgs),
    /// Lock new files so they can be added
    Add(PathsArgs),
    /// Lock and delete files
    Delete(PathsArgs),
    /// Submit files
    Submit(SubmitArgs),
    /// Revert files and release their locks
    Revert(RevertArgs),
    /// Refresh the repository status
    Fetch(FetchArgs),
    /// Mark conflicted files as resolved
    Resolve(PathsArgs),
    /// Lock the destination of a copy
    Copy(CopyArgs),
    /// Show the revision history of a file
    History(HistoryArgs),
    /// List files with local changes
    Diff,
    /// Run the inbound notification server
    Serve,
    /// Keep status fresh and print changes until interrupted
    Watch,
}

#[derive(Args)]
pub struct StatusArgs {
    /// Files or directories; everything cached when empty
    pub paths: Vec<PathBuf>,
    /// Answer from the cache without querying the daemon
    #[arg(long)]
    pub cached: bool,
}

#[derive(Args)]
pub struct PathsArgs {
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

#[derive(Args)]
pub struct SubmitArgs {
    #[arg(short, long)]
    pub message: String,
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

#[derive(Args)]
pub struct RevertArgs {
    /// Files to revert; every revertable file when empty
    pub paths: Vec<PathBuf>,
}

#[derive(Args)]
pub struct FetchArgs {
    /// Skip the status refresh
    #[arg(long)]
    pub no_status: bool,
}

#[derive(Args)]
pub struct CopyArgs {
    pub source: PathBuf,
    pub destination: PathBuf,
}

#[derive(Args)]
pub struct HistoryArgs {
    pub path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_submit() {
        let cli = Cli::parse_from(["tether", "submit", "-m", "Fix lighting", "Content/Maps/Arena.umap"]);
        match cli.command {
            Command::Submit(args) => {
                assert_eq!(args.message, "Fix lighting");
                assert_eq!(args.paths, vec![PathBuf::from("Content/Maps/Arena.umap")]);
            }
            _ => panic!("expected submit"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["tether", "fetch", "--no-status", "--format", "json", "-v"]);
        assert!(cli.verbose);
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(cli.command, Command::Fetch(FetchArgs { no_status: true })));
    }

    #[test]
    fn lock_requires_paths() {
        assert!(Cli::try_parse_from(["tether", "lock"]).is_err());
    }
}
