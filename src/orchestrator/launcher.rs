//! Agent session launcher.
//!
//! Creates the agent record, starts the agent CLI detached inside a new
//! tmux session, and verifies the session actually came up. Transcript
//! discovery is started in the background once the launch is verified,
//! decoupled from the launch response.

use std::sync::Arc;

use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn, Instrument};

use super::lifecycle::{LifecycleStateMachine, Teardown};
use super::log_discovery::{DiscoveryOutcome, LogDiscoverer};
use crate::config::GlobalConfig;
use crate::models::agent::{AgentRecord, AgentStatus};
use crate::models::launch::{LaunchRequest, LaunchResult};
use crate::multiplexer::{shell_command, Multiplexer, SessionSpec};
use crate::persistence::codebase_repo::CodebaseRepo;
use crate::{AppError, Result};

/// A verified launch plus the handle of its background discovery task.
pub struct Launched {
    /// Identifiers returned to the caller.
    pub result: LaunchResult,
    /// Background transcript discovery.
    pub discovery: JoinHandle<Option<DiscoveryOutcome>>,
}

/// Starts agent sessions and verifies startup.
pub struct SessionLauncher {
    mux: Arc<dyn Multiplexer>,
    lifecycle: Arc<LifecycleStateMachine>,
    codebases: CodebaseRepo,
    config: Arc<GlobalConfig>,
}

impl SessionLauncher {
    /// Construct a launcher.
    #[must_use]
    pub fn new(
        mux: Arc<dyn Multiplexer>,
        lifecycle: Arc<LifecycleStateMachine>,
        codebases: CodebaseRepo,
        config: Arc<GlobalConfig>,
    ) -> Self {
        Self {
            mux,
            lifecycle,
            codebases,
            config,
        }
    }

    /// Build the shell command line for `record`.
    #[must_use]
    pub fn agent_command(&self, record: &AgentRecord) -> String {
        let mut args: Vec<&str> = self.config.agent_cli_args.iter().map(String::as_str).collect();
        if let Some(ref model) = record.model {
            args.push(&self.config.model_flag);
            args.push(model);
        }
        args.push(&record.prompt);
        shell_command(&self.config.agent_cli, args)
    }

    /// Launch an agent and wait for its session to exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for incomplete requests,
    /// `AppError::NotFound` for unknown codebases, and `AppError::Process`
    /// when the session does not appear within the verification window.
    /// In the last case the record is left `Failed`.
    pub async fn launch(&self, request: &LaunchRequest) -> Result<Launched> {
        request.validate()?;
        let codebase = self.codebases.resolve(&request.codebase_id).await?;

        let record = self.lifecycle.create(request).await?;
        let span = info_span!(
            "launch",
            agent_id = %record.id,
            session_name = %record.session_name,
            codebase = %codebase.id
        );

        async {
            let discoverer = LogDiscoverer::new(
                Arc::clone(&self.lifecycle),
                self.config.log_root.clone(),
                self.config.discovery.extension.clone(),
                self.config.discovery_poll(),
                self.config.discovery_timeout(),
            );
            let baseline = match discoverer.snapshot().await {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    self.abort(&record, &err.to_string()).await;
                    return Err(err);
                }
            };

            let spec = SessionSpec {
                name: record.session_name.clone(),
                working_dir: codebase.path.clone(),
                command: self.agent_command(&record),
            };
            if let Err(err) = self.mux.new_session(&spec).await {
                let reason = format!("failed to start session: {err}");
                self.abort(&record, &reason).await;
                return Err(AppError::Process(reason));
            }

            if !self.verify_started(&record.session_name).await {
                let reason = format!(
                    "session {} did not appear within {}ms",
                    record.session_name, self.config.launch.verify_timeout_ms
                );
                self.abort(&record, &reason).await;
                return Err(AppError::Process(reason));
            }

            let pid = match self.mux.pane_pid(&record.session_name).await {
                Ok(pid) => pid,
                Err(err) => {
                    warn!(%err, "pane pid unavailable");
                    None
                }
            };
            if let Some(pid) = pid {
                self.lifecycle
                    .agents()
                    .set_pid(&record.id, i64::from(pid))
                    .await?;
            }

            let launched = self
                .lifecycle
                .transition(
                    &record.id,
                    AgentStatus::Launched,
                    json!({ "sessionName": record.session_name, "pid": pid }),
                    Teardown::Skip,
                )
                .await?;
            if launched.record.status != AgentStatus::Launched {
                return Err(AppError::Process(format!(
                    "agent left launch in status {}",
                    launched.record.status
                )));
            }

            info!("agent launched");
            let discovery = discoverer.spawn(record.id.clone(), baseline);
            Ok(Launched {
                result: LaunchResult {
                    agent_id: record.id.clone(),
                    session_name: record.session_name.clone(),
                },
                discovery,
            })
        }
        .instrument(span)
        .await
    }

    /// Poll `has-session` until it succeeds or the window elapses.
    async fn verify_started(&self, session_name: &str) -> bool {
        let started = tokio::time::Instant::now();
        let timeout = self.config.verify_timeout();
        loop {
            match self.mux.has_session(session_name).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(err) => warn!(%err, "has-session probe failed"),
            }
            if started.elapsed() >= timeout {
                return false;
            }
            tokio::time::sleep(self.config.verify_poll()).await;
        }
    }

    async fn abort(&self, record: &AgentRecord, reason: &str) {
        warn!(reason, "launch failed");
        if let Err(err) = self.lifecycle.fail(&record.id, reason, Teardown::Skip).await {
            warn!(%err, "failed to mark launch failure");
        }
    }
}
