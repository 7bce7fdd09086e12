//! Session termination with server-wide fallback.
//!
//! A targeted `kill-session` is tried first. When it fails (session already
//! gone, or the name no longer resolves) the whole multiplexer server is
//! killed, unless `terminate.kill_server_fallback` is off. That fallback
//! tears down every session on the server, including unrelated agents.

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn, Instrument};

use crate::multiplexer::Multiplexer;

/// How a termination request was satisfied.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KillMethod {
    /// The named session was killed.
    Session,
    /// The whole multiplexer server was killed.
    Server,
    /// Nothing was left to kill.
    None,
}

impl KillMethod {
    /// Stable lowercase name used in event payloads.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Server => "server",
            Self::None => "none",
        }
    }
}

impl Display for KillMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kills agent sessions. Never fails from the caller's perspective.
#[derive(Clone)]
pub struct Terminator {
    mux: Arc<dyn Multiplexer>,
    kill_server_fallback: bool,
}

impl Terminator {
    /// Construct a terminator over `mux`.
    #[must_use]
    pub fn new(mux: Arc<dyn Multiplexer>, kill_server_fallback: bool) -> Self {
        Self {
            mux,
            kill_server_fallback,
        }
    }

    /// Kill `session_name`, falling back to the server when configured.
    ///
    /// Already-dead sessions are a successful outcome and report
    /// [`KillMethod::None`] when nothing else could be killed either.
    pub async fn terminate(&self, session_name: &str) -> KillMethod {
        let span = info_span!("terminate", session_name);
        async {
            match self.mux.kill_session(session_name).await {
                Ok(()) => {
                    info!("session killed");
                    return KillMethod::Session;
                }
                Err(err) => {
                    warn!(%err, "kill-session failed");
                }
            }

            if !self.kill_server_fallback {
                info!("server fallback disabled; treating session as already dead");
                return KillMethod::None;
            }

            match self.mux.kill_server().await {
                Ok(()) => {
                    warn!("killed multiplexer server as fallback");
                    KillMethod::Server
                }
                Err(err) => {
                    info!(%err, "no server to kill; session already dead");
                    KillMethod::None
                }
            }
        }
        .instrument(span)
        .await
    }
}
