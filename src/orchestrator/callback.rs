//! Best-effort webhook delivery of an agent's final state.
//!
//! One POST per call, no retries. The outcome is recorded as a
//! `CallbackSent` event; the persisted record stays authoritative either way.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, info_span, warn, Instrument};

use super::lifecycle::LifecycleStateMachine;
use crate::models::agent::{AgentRecord, AgentStatus};
use crate::models::event::EventKind;
use crate::models::launch::LaunchResult;
use crate::{AppError, Result};

/// JSON body posted to the callback URL.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallbackPayload {
    /// Generated agent identifier.
    pub agent_id: String,
    /// tmux session that hosted the agent.
    pub session_name: String,
    /// Caller-side execution identifier.
    pub execution_id: String,
    /// Agent role.
    pub role: String,
    /// Final status.
    pub status: AgentStatus,
    /// Discovered transcript path.
    pub log_file: Option<String>,
    /// Agent-side session id.
    pub session_id: Option<String>,
    /// Parsed transcript summary.
    pub context: Option<Value>,
}

impl CallbackPayload {
    /// Merge the launch result with the final record.
    #[must_use]
    pub fn merge(launch: &LaunchResult, record: &AgentRecord) -> Self {
        Self {
            agent_id: launch.agent_id.clone(),
            session_name: launch.session_name.clone(),
            execution_id: record.execution_id.clone(),
            role: record.role.clone(),
            status: record.status,
            log_file: record.log_file.clone(),
            session_id: record.session_id.clone(),
            context: record.context.clone(),
        }
    }
}

/// Delivery result as recorded in the `CallbackSent` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The server answered; `success` reflects a 2xx status.
    Delivered {
        /// HTTP status code.
        status_code: u16,
        /// Whether the status code was 2xx.
        success: bool,
    },
    /// The request could not be completed.
    Failed {
        /// Transport error description.
        error: String,
    },
}

impl CallbackOutcome {
    /// Event payload for this outcome.
    #[must_use]
    pub fn to_event_data(&self, url: &str) -> Value {
        match self {
            Self::Delivered {
                status_code,
                success,
            } => json!({ "url": url, "statusCode": status_code, "success": success }),
            Self::Failed { error } => json!({ "url": url, "success": false, "error": error }),
        }
    }
}

/// Posts final agent state to caller-supplied URLs.
pub struct CallbackNotifier {
    client: Client,
    lifecycle: Arc<LifecycleStateMachine>,
}

impl CallbackNotifier {
    /// Construct a notifier with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP client cannot be built.
    pub fn new(lifecycle: Arc<LifecycleStateMachine>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;
        Ok(Self { client, lifecycle })
    }

    /// POST `payload` to `url` once and record the outcome.
    ///
    /// Delivery failures are swallowed and only recorded.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the `CallbackSent` event cannot be stored.
    pub async fn notify(&self, url: &str, payload: &CallbackPayload) -> Result<CallbackOutcome> {
        let span = info_span!("callback", agent_id = %payload.agent_id, url);
        async {
            let outcome = match self.post(url, payload).await {
                Ok(status_code) => {
                    let success = (200..300).contains(&status_code);
                    if success {
                        info!(status_code, "callback delivered");
                    } else {
                        warn!(status_code, "callback rejected");
                    }
                    CallbackOutcome::Delivered {
                        status_code,
                        success,
                    }
                }
                Err(err) => {
                    warn!(%err, "callback delivery failed");
                    CallbackOutcome::Failed {
                        error: err.to_string(),
                    }
                }
            };

            self.lifecycle
                .record_event(
                    &payload.agent_id,
                    EventKind::CallbackSent,
                    outcome.to_event_data(url),
                )
                .await
                .map(|_| outcome)
        }
        .instrument(span)
        .await
    }

    async fn post(&self, url: &str, payload: &CallbackPayload) -> Result<u16> {
        let response = self.client.post(url).json(payload).send().await?;
        Ok(response.status().as_u16())
    }
}
