//! Boundary: everything discovery reads from the host system.
//!
//! Subprocess invocations, `PATH` lookups, environment variables and symlink
//! resolution all go through [`CommandRunner`] so the discovery logic can be
//! exercised against scripted fakes.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;

/// Future returned by [`CommandRunner::run`].
pub type CommandFut<'a> = Pin<Box<dyn Future<Output = io::Result<CommandOutput>> + Send + 'a>>;

/// Captured result of a finished subprocess.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    #[must_use]
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// First non-empty stdout line, trimmed.
    #[must_use]
    pub fn first_line(&self) -> Option<&str> {
        self.stdout.lines().map(str::trim).find(|l| !l.is_empty())
    }
}

pub trait CommandRunner: Send + Sync {
    /// Run `program` to completion and capture its output.
    fn run<'a>(&'a self, program: &'a Path, args: &'a [&'a str]) -> CommandFut<'a>;

    /// Resolve `name` against `PATH`.
    fn find_in_path(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }

    fn env_var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }

    /// Follow symlinks to the real file. Paths that cannot be canonicalized
    /// are returned as given.
    fn resolve_symlinks(&self, path: &Path) -> PathBuf {
        std::fs::canonicalize(path).unwrap_or_else(|e| {
            tracing::debug!(path = %path.display(), "Could not canonicalize: {e}");
            path.to_path_buf()
        })
    }
}

/// Runs real subprocesses on the tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandRunner;

impl CommandRunner for TokioCommandRunner {
    fn run<'a>(&'a self, program: &'a Path, args: &'a [&'a str]) -> CommandFut<'a> {
        Box::pin(async move {
            tracing::debug!(program = %program.display(), ?args, "Running discovery command");
            let output = tokio::process::Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output()
                .await?;
            Ok(CommandOutput {
                success: output.status.success(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
    }
}
