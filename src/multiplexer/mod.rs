//! Terminal multiplexer abstraction.
//!
//! The [`Multiplexer`] trait decouples the supervision engine from the
//! concrete multiplexer. [`TmuxMultiplexer`] shells out to `tmux`; tests
//! substitute a scripted implementation.

pub mod tmux;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use crate::Result;

pub use tmux::TmuxMultiplexer;

/// Boxed future returned by [`Multiplexer`] operations.
pub type MuxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Everything needed to start one detached session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSpec {
    /// Session name, `agent_<id>`.
    pub name: String,
    /// Working directory of the initial pane.
    pub working_dir: PathBuf,
    /// Shell command line run in the initial pane.
    pub command: String,
}

/// Session control operations the engine relies on.
///
/// All operations address sessions by name. Implementations must be safe
/// to call concurrently for different sessions.
pub trait Multiplexer: Send + Sync {
    /// Start a detached session running `spec.command`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Session`](crate::AppError::Session) if the session cannot be created.
    fn new_session<'a>(&'a self, spec: &'a SessionSpec) -> MuxFuture<'a, ()>;

    /// Whether a session with this name currently exists.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Session`](crate::AppError::Session) if the multiplexer cannot be queried.
    fn has_session<'a>(&'a self, name: &'a str) -> MuxFuture<'a, bool>;

    /// Capture the visible contents of the session's active pane.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Session`](crate::AppError::Session) if the capture fails.
    fn capture_pane<'a>(&'a self, name: &'a str) -> MuxFuture<'a, String>;

    /// Process id of the session's initial pane, if reported.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Session`](crate::AppError::Session) if the query fails.
    fn pane_pid<'a>(&'a self, name: &'a str) -> MuxFuture<'a, Option<u32>>;

    /// Kill one session.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Session`](crate::AppError::Session) if the session is gone or the kill fails.
    fn kill_session<'a>(&'a self, name: &'a str) -> MuxFuture<'a, ()>;

    /// Kill the multiplexer server and every session it hosts.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Session`](crate::AppError::Session) if no server is running or the kill fails.
    fn kill_server(&self) -> MuxFuture<'_, ()>;
}

/// Quote a single argument for a POSIX shell.
#[must_use]
pub fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', "'\\''"))
}

/// Join a program and its arguments into one shell command line.
#[must_use]
pub fn shell_command<I, S>(program: &str, args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut line = shell_quote(program);
    for arg in args {
        line.push(' ');
        line.push_str(&shell_quote(arg.as_ref()));
    }
    line
}
