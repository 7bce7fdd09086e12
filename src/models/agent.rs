//! Agent record model and lifecycle helpers.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppError;

/// Lifecycle status for a supervised agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Record created, session not yet started.
    Preparing,
    /// Session verified to exist.
    Launched,
    /// Pane output still changing.
    Running,
    /// Pane output went idle; presumed finished.
    Completed,
    /// Session missing, failed to start, or killed.
    Failed,
}

impl AgentStatus {
    /// Whether no further transitions can occur.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Determine whether moving from `self` to `next` is permitted.
    ///
    /// Staying in the same status is not a transition and returns `false`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Preparing, Self::Launched | Self::Failed)
                | (
                    Self::Launched,
                    Self::Running | Self::Completed | Self::Failed
                )
                | (Self::Running, Self::Completed | Self::Failed)
        )
    }

    /// Stable lowercase name used in storage and payloads.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Preparing => "preparing",
            Self::Launched => "launched",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl Display for AgentStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preparing" => Ok(Self::Preparing),
            "launched" => Ok(Self::Launched),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(AppError::Db(format!("invalid agent status: {other}"))),
        }
    }
}

/// Derive the tmux session name for an agent id.
#[must_use]
pub fn session_name_for(agent_id: &str) -> String {
    format!("agent_{agent_id}")
}

/// A supervised agent run, persisted in `SQLite`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct AgentRecord {
    /// Unique record identifier.
    pub id: String,
    /// Caller-side execution this agent belongs to.
    pub execution_id: String,
    /// Role the agent plays in the execution.
    pub role: String,
    /// Initial instruction passed to the agent CLI.
    pub prompt: String,
    /// Model override, if any.
    pub model: Option<String>,
    /// Current lifecycle status.
    pub status: AgentStatus,
    /// tmux session hosting the agent; derived from `id`.
    pub session_name: String,
    /// Transcript file discovered after launch.
    pub log_file: Option<String>,
    /// Agent-side session id extracted from the transcript path.
    pub session_id: Option<String>,
    /// Pane process id reported by tmux.
    pub pid: Option<i64>,
    /// Parsed transcript summary captured at the end of the run.
    pub context: Option<serde_json::Value>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl AgentRecord {
    /// Construct a new `Preparing` record with a generated identifier.
    #[must_use]
    pub fn new(execution_id: String, role: String, prompt: String, model: Option<String>) -> Self {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let session_name = session_name_for(&id);
        Self {
            id,
            execution_id,
            role,
            prompt,
            model,
            status: AgentStatus::Preparing,
            session_name,
            log_file: None,
            session_id: None,
            pid: None,
            context: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Idle-detection state carried between samples of one agent.
///
/// Persisted so that pings issued by separate processes compare against
/// the same baseline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdleBaseline {
    /// Hash of the last distinct pane capture.
    pub last_hash: Option<String>,
    /// Consecutive samples matching `last_hash`.
    pub unchanged: u32,
}
