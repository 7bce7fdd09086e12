//! `tmux` command-line backend.

use std::process::Output;

use tokio::process::Command;
use tracing::debug;

use super::{Multiplexer, MuxFuture, SessionSpec};
use crate::{AppError, Result};

/// [`Multiplexer`] implementation that shells out to the `tmux` binary.
#[derive(Debug, Clone)]
pub struct TmuxMultiplexer {
    program: String,
}

impl Default for TmuxMultiplexer {
    fn default() -> Self {
        Self::new("tmux")
    }
}

impl TmuxMultiplexer {
    /// Use the given `tmux` executable.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<Output> {
        debug!(program = %self.program, ?args, "running tmux");
        Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| AppError::Session(format!("failed to run {}: {err}", self.program)))
    }

    async fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args).await?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(AppError::Session(format!(
                "tmux {} exited with {}: {}",
                args.first().copied().unwrap_or_default(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

impl Multiplexer for TmuxMultiplexer {
    fn new_session<'a>(&'a self, spec: &'a SessionSpec) -> MuxFuture<'a, ()> {
        Box::pin(async move {
            let dir = spec.working_dir.to_string_lossy();
            self.run_checked(&[
                "new-session",
                "-d",
                "-s",
                &spec.name,
                "-c",
                &dir,
                &spec.command,
            ])
            .await?;
            Ok(())
        })
    }

    fn has_session<'a>(&'a self, name: &'a str) -> MuxFuture<'a, bool> {
        Box::pin(async move {
            let target = format!("={name}");
            let output = self.run(&["has-session", "-t", &target]).await?;
            Ok(output.status.success())
        })
    }

    fn capture_pane<'a>(&'a self, name: &'a str) -> MuxFuture<'a, String> {
        Box::pin(async move {
            let output = self.run_checked(&["capture-pane", "-p", "-t", name]).await?;
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        })
    }

    fn pane_pid<'a>(&'a self, name: &'a str) -> MuxFuture<'a, Option<u32>> {
        Box::pin(async move {
            let output = self
                .run_checked(&["display-message", "-p", "-t", name, "#{pane_pid}"])
                .await?;
            Ok(String::from_utf8_lossy(&output.stdout).trim().parse().ok())
        })
    }

    fn kill_session<'a>(&'a self, name: &'a str) -> MuxFuture<'a, ()> {
        Box::pin(async move {
            let target = format!("={name}");
            self.run_checked(&["kill-session", "-t", &target]).await?;
            Ok(())
        })
    }

    fn kill_server(&self) -> MuxFuture<'_, ()> {
        Box::pin(async move {
            self.run_checked(&["kill-server"]).await?;
            Ok(())
        })
    }
}
