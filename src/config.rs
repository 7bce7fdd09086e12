//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Startup verification settings for new sessions.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct LaunchConfig {
    /// How long to wait for `has-session` to succeed.
    pub verify_timeout_ms: u64,
    /// Delay between `has-session` probes.
    pub verify_poll_ms: u64,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            verify_timeout_ms: 10_000,
            verify_poll_ms: 500,
        }
    }
}

/// Output-log discovery settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct DiscoveryConfig {
    /// How long to keep re-walking the log root after launch.
    pub timeout_ms: u64,
    /// Delay between walks.
    pub poll_ms: u64,
    /// File extension (without dot) that identifies agent transcripts.
    pub extension: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            poll_ms: 500,
            extension: "jsonl".into(),
        }
    }
}

/// Liveness and idleness polling settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct MonitorConfig {
    /// Delay between samples in a watch loop.
    pub interval_ms: u64,
    /// Consecutive unchanged pane samples required before declaring the
    /// agent finished. `1` means a single repeated capture completes it.
    pub idle_samples: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            idle_samples: 1,
        }
    }
}

/// Session termination settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct TerminateConfig {
    /// Kill the whole tmux server when the targeted `kill-session` fails.
    ///
    /// This takes down every session on the server, not only the agent's.
    pub kill_server_fallback: bool,
}

impl Default for TerminateConfig {
    fn default() -> Self {
        Self {
            kill_server_fallback: true,
        }
    }
}

/// Webhook delivery settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct CallbackConfig {
    /// Request timeout for a single delivery attempt.
    pub timeout_ms: u64,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self { timeout_ms: 30_000 }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".agent-warden").join("warden.db")
}

fn default_log_root() -> PathBuf {
    PathBuf::from(".claude").join("projects")
}

fn default_agent_cli() -> String {
    "claude".into()
}

fn default_model_flag() -> String {
    "--model".into()
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// `SQLite` database file holding agent records and events.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Directory the agent CLI writes its transcripts under.
    #[serde(default = "default_log_root")]
    pub log_root: PathBuf,
    /// Agent CLI binary launched inside each session.
    #[serde(default = "default_agent_cli")]
    pub agent_cli: String,
    /// Arguments placed before the prompt on every launch.
    #[serde(default)]
    pub agent_cli_args: Vec<String>,
    /// Flag used to pass the optional model name.
    #[serde(default = "default_model_flag")]
    pub model_flag: String,
    /// Startup verification.
    #[serde(default)]
    pub launch: LaunchConfig,
    /// Log discovery.
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// Liveness polling.
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Session termination.
    #[serde(default)]
    pub terminate: TerminateConfig,
    /// Webhook delivery.
    #[serde(default)]
    pub callback: CallbackConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_root: default_log_root(),
            agent_cli: default_agent_cli(),
            agent_cli_args: Vec::new(),
            model_flag: default_model_flag(),
            launch: LaunchConfig::default(),
            discovery: DiscoveryConfig::default(),
            monitor: MonitorConfig::default(),
            terminate: TerminateConfig::default(),
            callback: CallbackConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Delay between `has-session` probes during launch.
    #[must_use]
    pub fn verify_poll(&self) -> Duration {
        Duration::from_millis(self.launch.verify_poll_ms)
    }

    /// Upper bound on launch verification.
    #[must_use]
    pub fn verify_timeout(&self) -> Duration {
        Duration::from_millis(self.launch.verify_timeout_ms)
    }

    /// Delay between log-root walks.
    #[must_use]
    pub fn discovery_poll(&self) -> Duration {
        Duration::from_millis(self.discovery.poll_ms)
    }

    /// Upper bound on log discovery.
    #[must_use]
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery.timeout_ms)
    }

    /// Delay between watch-loop samples.
    #[must_use]
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor.interval_ms)
    }

    /// Webhook request timeout.
    #[must_use]
    pub fn callback_timeout(&self) -> Duration {
        Duration::from_millis(self.callback.timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.agent_cli.trim().is_empty() {
            return Err(AppError::Config("agent_cli must not be empty".into()));
        }
        if self.monitor.idle_samples == 0 {
            return Err(AppError::Config(
                "monitor.idle_samples must be greater than zero".into(),
            ));
        }
        let intervals = [
            ("launch.verify_poll_ms", self.launch.verify_poll_ms),
            ("discovery.poll_ms", self.discovery.poll_ms),
            ("monitor.interval_ms", self.monitor.interval_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(AppError::Config(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        if self.discovery.extension.starts_with('.') {
            return Err(AppError::Config(
                "discovery.extension must not start with a dot".into(),
            ));
        }
        Ok(())
    }
}
