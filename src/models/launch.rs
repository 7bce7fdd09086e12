//! Launch request and result payloads.

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// Caller input for starting a supervised agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LaunchRequest {
    /// Caller-side execution identifier.
    pub execution_id: String,
    /// Codebase to run the agent in.
    pub codebase_id: String,
    /// Instruction passed to the agent CLI.
    pub prompt: String,
    /// Role label recorded on the agent.
    pub role: String,
    /// Optional model override.
    #[serde(default)]
    pub model: Option<String>,
}

impl LaunchRequest {
    /// Check that every required field is present.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` naming the missing fields.
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("executionId", &self.execution_id),
            ("codebaseId", &self.codebase_id),
            ("prompt", &self.prompt),
            ("role", &self.role),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Returned once the agent session is verified.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LaunchResult {
    /// Generated agent identifier.
    pub agent_id: String,
    /// tmux session hosting the agent.
    pub session_name: String,
}
