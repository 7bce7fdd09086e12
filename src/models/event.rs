//! Lifecycle event model.
//!
//! Every status transition and every notable side effect (log discovery,
//! callback delivery, manual kill, session teardown) is stored as one
//! immutable [`Event`]. The per-agent trail ordered by timestamp is the
//! audit record of the run.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::agent::AgentStatus;
use crate::AppError;

/// Event type tag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Record created.
    Preparing,
    /// Session verified.
    Launched,
    /// Output changed since the last sample.
    Running,
    /// Output went idle.
    Completed,
    /// Run failed.
    Failed,
    /// Transcript file attributed to the agent.
    LogDiscovered,
    /// Transcript file could not be attributed.
    LogDiscoveryFailed,
    /// Webhook delivery attempted.
    CallbackSent,
    /// Operator requested a kill.
    ManuallyKilled,
    /// Session torn down after reaching a terminal state.
    SessionTerminated,
}

impl EventKind {
    /// Event emitted when a record enters `status`.
    #[must_use]
    pub fn for_status(status: AgentStatus) -> Self {
        match status {
            AgentStatus::Preparing => Self::Preparing,
            AgentStatus::Launched => Self::Launched,
            AgentStatus::Running => Self::Running,
            AgentStatus::Completed => Self::Completed,
            AgentStatus::Failed => Self::Failed,
        }
    }

    /// Stable lowercase name used in storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Preparing => "preparing",
            Self::Launched => "launched",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::LogDiscovered => "log_discovered",
            Self::LogDiscoveryFailed => "log_discovery_failed",
            Self::CallbackSent => "callback_sent",
            Self::ManuallyKilled => "manually_killed",
            Self::SessionTerminated => "session_terminated",
        }
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preparing" => Ok(Self::Preparing),
            "launched" => Ok(Self::Launched),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "log_discovered" => Ok(Self::LogDiscovered),
            "log_discovery_failed" => Ok(Self::LogDiscoveryFailed),
            "callback_sent" => Ok(Self::CallbackSent),
            "manually_killed" => Ok(Self::ManuallyKilled),
            "session_terminated" => Ok(Self::SessionTerminated),
            other => Err(AppError::Db(format!("invalid event kind: {other}"))),
        }
    }
}

/// An immutable lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Event {
    /// Unique event identifier.
    pub id: String,
    /// Previous event of the same agent, when known.
    pub parent_id: Option<String>,
    /// Agent the event belongs to.
    pub agent_id: String,
    /// Event type tag.
    pub kind: EventKind,
    /// Structured payload.
    pub data: serde_json::Value,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Construct a new event stamped with the current time.
    #[must_use]
    pub fn new(
        agent_id: String,
        kind: EventKind,
        data: serde_json::Value,
        parent_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id,
            agent_id,
            kind,
            data,
            timestamp: Utc::now(),
        }
    }
}
