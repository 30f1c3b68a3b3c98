//! Version-control client.
//!
//! [`VersionControl::clone_or_refresh`] brings a local clone in line with
//! an upstream ref and reports whether anything changed. [`GitCli`]
//! implements it by shelling out to the `git` executable.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::process::ProcessRegistry;

/// Errors from the version-control layer.
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    /// The executable could not be started or waited on.
    #[error("Failed to execute {program}: {source}")]
    Exec {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A git command ran but exited unsuccessfully.
    #[error("`git {command}` failed (exit {code}): {stderr}")]
    Command {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait::async_trait]
pub trait VersionControl: Send + Sync {
    /// Clone `url` at `git_ref` into `local_dir`, or bring an existing
    /// clone up to date. Returns `true` when the checked-out revision
    /// changed (a fresh clone always counts as a change).
    async fn clone_or_refresh(
        &self,
        url: &str,
        git_ref: &str,
        local_dir: &Path,
    ) -> Result<bool, VcsError>;
}

/// [`VersionControl`] backed by the git command line.
///
/// Every spawned git process is tracked in the [`ProcessRegistry`] for
/// as long as it runs.
pub struct GitCli {
    program: String,
    processes: ProcessRegistry,
}

impl GitCli {
    pub fn new(program: impl Into<String>, processes: ProcessRegistry) -> Self {
        Self {
            program: program.into(),
            processes,
        }
    }

    async fn clone_fresh(
        &self,
        url: &str,
        git_ref: &str,
        local_dir: &Path,
    ) -> Result<(), VcsError> {
        if tokio::fs::try_exists(local_dir).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(local_dir)
                .await
                .map_err(|source| io_error(local_dir, source))?;
        }
        if let Some(parent) = local_dir.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| io_error(parent, source))?;
        }

        tracing::info!(url, git_ref, dir = %local_dir.display(), "Cloning source repository");
        self.run(
            None,
            &[
                OsStr::new("clone"),
                OsStr::new("--depth"),
                OsStr::new("1"),
                OsStr::new("--branch"),
                OsStr::new(git_ref),
                OsStr::new(url),
                local_dir.as_os_str(),
            ],
        )
        .await?;
        Ok(())
    }

    async fn refresh(
        &self,
        url: &str,
        git_ref: &str,
        local_dir: &Path,
        head: String,
    ) -> Result<bool, VcsError> {
        let dir = Some(local_dir);
        self.run(
            dir,
            &[
                OsStr::new("remote"),
                OsStr::new("set-url"),
                OsStr::new("origin"),
                OsStr::new(url),
            ],
        )
        .await?;
        self.run(
            dir,
            &[
                OsStr::new("fetch"),
                OsStr::new("--depth"),
                OsStr::new("1"),
                OsStr::new("origin"),
                OsStr::new(git_ref),
            ],
        )
        .await?;

        let fetched = self.rev_parse(local_dir, "FETCH_HEAD").await?;
        if fetched == head {
            tracing::debug!(url, git_ref, revision = %head, "Source repository unchanged");
            return Ok(false);
        }

        self.run(
            dir,
            &[OsStr::new("reset"), OsStr::new("--hard"), OsStr::new("FETCH_HEAD")],
        )
        .await?;
        self.run(dir, &[OsStr::new("clean"), OsStr::new("-fdx")]).await?;

        tracing::info!(url, git_ref, from = %head, to = %fetched, "Source repository updated");
        Ok(true)
    }

    async fn rev_parse(&self, local_dir: &Path, rev: &str) -> Result<String, VcsError> {
        self.run(Some(local_dir), &[OsStr::new("rev-parse"), OsStr::new(rev)])
            .await
    }

    /// Run git and return its trimmed stdout.
    async fn run(&self, cwd: Option<&Path>, args: &[&OsStr]) -> Result<String, VcsError> {
        let command = args
            .iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");

        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|source| self.exec_error(source))?;
        let guard = child
            .id()
            .map(|pid| self.processes.track(pid, format!("git {command}")));
        let output = child.wait_with_output().await;
        // Reaped: the pid may be reused from here on.
        drop(guard);
        let output = output.map_err(|source| self.exec_error(source))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VcsError::Command {
                command,
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn exec_error(&self, source: std::io::Error) -> VcsError {
        VcsError::Exec {
            program: self.program.clone(),
            source,
        }
    }
}

#[async_trait::async_trait]
impl VersionControl for GitCli {
    async fn clone_or_refresh(
        &self,
        url: &str,
        git_ref: &str,
        local_dir: &Path,
    ) -> Result<bool, VcsError> {
        let has_git_dir = tokio::fs::try_exists(local_dir.join(".git"))
            .await
            .unwrap_or(false);

        if has_git_dir {
            match self.rev_parse(local_dir, "HEAD").await {
                Ok(head) => return self.refresh(url, git_ref, local_dir, head).await,
                Err(e) => {
                    tracing::warn!(
                        dir = %local_dir.display(),
                        error = %e,
                        "Existing clone is unusable, cloning again",
                    );
                }
            }
        }

        self.clone_fresh(url, git_ref, local_dir).await?;
        Ok(true)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> VcsError {
    VcsError::Io {
        path: path.to_path_buf(),
        source,
    }
}
