use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::error::{StatusError, StatusResult};

/// Upper bound on file arguments per git invocation, to stay under
/// command-line length limits.
pub const MAX_FILES_PER_BATCH: usize = 50;

/// Collected output of one logical git command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GitOutput {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    /// Diagnostics that were demoted from `stderr` because they do not
    /// indicate failure.
    pub info: Vec<String>,
    pub exit_code: i32,
}

impl GitOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout(lines: &[&str]) -> Self {
        Self {
            stdout: lines.iter().map(|l| l.to_string()).collect(),
            ..Self::default()
        }
    }

    fn absorb(&mut self, other: GitOutput) {
        self.stdout.extend(other.stdout);
        self.stderr.extend(other.stderr);
        self.info.extend(other.info);
        if self.exit_code == 0 {
            self.exit_code = other.exit_code;
        }
    }

    /// Move "outside repository" complaints to `info`. If nothing else was
    /// reported on stderr, the command counts as successful.
    pub fn without_redundant_errors(mut self) -> Self {
        let (redundant, remaining): (Vec<String>, Vec<String>) = self
            .stderr
            .into_iter()
            .partition(|line| line.contains("' is outside repository"));
        self.stderr = remaining;
        if !redundant.is_empty() {
            self.info.extend(redundant);
            if self.stderr.is_empty() {
                self.exit_code = 0;
            }
        }
        self
    }

    /// Turn a failed output into an error.
    pub fn into_result(self, command: &str) -> StatusResult<GitOutput> {
        if self.success() {
            Ok(self)
        } else {
            Err(StatusError::Git {
                command: command.to_string(),
                code: self.exit_code,
                stderr: self.stderr.join("\n"),
            })
        }
    }
}

/// Synchronous git invocation.
pub trait GitRunner: Send + Sync {
    fn run(&self, command: &str, params: &[String], files: &[String]) -> StatusResult<GitOutput>;
}

/// Split `files` into batches and run each, concatenating output. A command
/// with no files runs once.
pub fn run_batched<F>(files: &[String], mut run_one: F) -> StatusResult<GitOutput>
where
    F: FnMut(&[String]) -> StatusResult<GitOutput>,
{
    if files.is_empty() {
        return run_one(&[]);
    }
    let mut combined = GitOutput::default();
    for batch in files.chunks(MAX_FILES_PER_BATCH) {
        combined.absorb(run_one(batch)?);
    }
    Ok(combined)
}

/// Runs the `git` executable against a working copy.
pub struct SystemGit {
    binary: PathBuf,
    repo_root: PathBuf,
}

impl SystemGit {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self::with_binary("git", repo_root)
    }

    pub fn with_binary(binary: impl Into<PathBuf>, repo_root: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into(), repo_root: repo_root.into() }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    fn invoke(&self, command: &str, params: &[String], files: &[String]) -> StatusResult<GitOutput> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-C").arg(&self.repo_root).arg(command).args(params);
        if !files.is_empty() {
            cmd.arg("--").args(files);
        }
        debug!(command, files = files.len(), "running git");

        let output = cmd.output()?;
        let lines = |bytes: &[u8]| {
            String::from_utf8_lossy(bytes)
                .lines()
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        };
        Ok(GitOutput {
            stdout: lines(&output.stdout),
            stderr: lines(&output.stderr),
            info: Vec::new(),
            exit_code: output.status.code().unwrap_or(-1),
        }
        .without_redundant_errors())
    }
}

impl GitRunner for SystemGit {
    fn run(&self, command: &str, params: &[String], files: &[String]) -> StatusResult<GitOutput> {
        run_batched(files, |batch| self.invoke(command, params, batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("Content/{i}.uasset")).collect()
    }

    #[test]
    fn batches_are_capped() {
        let mut sizes = Vec::new();
        let out = run_batched(&files(120), |batch| {
            sizes.push(batch.len());
            Ok(GitOutput::stdout(&[batch[0].as_str()]))
        })
        .unwrap();

        assert_eq!(sizes, vec![50, 50, 20]);
        assert_eq!(out.stdout, vec!["Content/0.uasset", "Content/50.uasset", "Content/100.uasset"]);
        assert!(out.success());
    }

    #[test]
    fn no_files_runs_once() {
        let mut calls = 0;
        run_batched(&[], |batch| {
            calls += 1;
            assert!(batch.is_empty());
            Ok(GitOutput::default())
        })
        .unwrap();
        assert_eq!(calls, 1);
    }

    #[test]
    fn first_failure_code_is_kept() {
        let mut n = 0;
        let out = run_batched(&files(60), |_| {
            n += 1;
            Ok(GitOutput { exit_code: if n == 1 { 128 } else { 0 }, ..GitOutput::default() })
        })
        .unwrap();
        assert_eq!(out.exit_code, 128);
    }

    #[test]
    fn outside_repository_errors_are_demoted() {
        let out = GitOutput {
            stderr: vec!["fatal: '/elsewhere/a.txt' is outside repository".into()],
            exit_code: 128,
            ..GitOutput::default()
        }
        .without_redundant_errors();

        assert!(out.success());
        assert!(out.stderr.is_empty());
        assert_eq!(out.info.len(), 1);
    }

    #[test]
    fn real_errors_stay_errors() {
        let out = GitOutput {
            stderr: vec![
                "fatal: '/elsewhere/a.txt' is outside repository".into(),
                "error: pathspec did not match".into(),
            ],
            exit_code: 1,
            ..GitOutput::default()
        }
        .without_redundant_errors();

        assert!(!out.success());
        assert!(out.into_result("add").is_err());
    }

    #[test]
    fn missing_binary_is_spawn_error() {
        let git = SystemGit::with_binary("/nonexistent/git-binary", ".");
        let err = git.run("status", &[], &[]).unwrap_err();
        assert!(matches!(err, StatusError::Spawn(_)));
    }
}
