//! Liveness and idleness detection by pane-output hashing.
//!
//! The agent CLI gives no structured completion signal, so completion is
//! inferred: a session that still exists but whose visible output has not
//! changed for `idle_samples` consecutive samples is presumed finished.
//!
//! [`IdleTracker::observe`] is the pure transition function. Both
//! [`LivenessMonitor::ping_once`] and
//! [`LivenessMonitor::watch_until_terminal`] are built on it. Each monitor
//! owns its tracker and scratch buffer, so concurrently supervised agents
//! never share comparison state. The tracker's baseline is persisted after
//! every sample and restored by the first sample of a fresh monitor.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use super::lifecycle::LifecycleStateMachine;
use crate::models::agent::{AgentRecord, AgentStatus, IdleBaseline};
use crate::multiplexer::Multiplexer;
use crate::persistence::baseline_repo::IdleBaselineRepo;
use crate::Result;

/// One sample of an agent session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// The session no longer exists.
    Missing,
    /// The session exists; hash of its visible pane.
    Pane {
        /// SHA-256 hex digest of the captured output.
        hash: String,
    },
    /// Checking or capturing failed.
    Error(String),
}

/// Per-agent comparison state for idle detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdleTracker {
    baseline: IdleBaseline,
    idle_samples: u32,
}

impl IdleTracker {
    /// Tracker requiring `idle_samples` unchanged samples (minimum 1).
    #[must_use]
    pub fn new(idle_samples: u32) -> Self {
        Self {
            baseline: IdleBaseline::default(),
            idle_samples: idle_samples.max(1),
        }
    }

    /// Continue from a previously saved baseline.
    pub fn restore(&mut self, baseline: IdleBaseline) {
        self.baseline = baseline;
    }

    /// Current comparison state.
    #[must_use]
    pub fn baseline(&self) -> &IdleBaseline {
        &self.baseline
    }

    /// Baseline hash the next sample is compared against.
    #[must_use]
    pub fn last_hash(&self) -> Option<&str> {
        self.baseline.last_hash.as_deref()
    }

    /// Fold one observation into the tracker and return the inferred status.
    ///
    /// Missing sessions and errors are `Failed`. A hash equal to the
    /// baseline counts toward idleness and yields `Completed` once the
    /// threshold is reached; any other hash becomes the new baseline and
    /// yields `Running`.
    pub fn observe(&mut self, observation: &Observation) -> AgentStatus {
        match observation {
            Observation::Missing | Observation::Error(_) => AgentStatus::Failed,
            Observation::Pane { hash } => {
                let baseline = &mut self.baseline;
                if baseline.last_hash.as_deref() == Some(hash.as_str()) {
                    baseline.unchanged = baseline.unchanged.saturating_add(1);
                    if baseline.unchanged >= self.idle_samples {
                        AgentStatus::Completed
                    } else {
                        AgentStatus::Running
                    }
                } else {
                    baseline.last_hash = Some(hash.clone());
                    baseline.unchanged = 0;
                    AgentStatus::Running
                }
            }
        }
    }
}

/// SHA-256 hex digest of captured pane text.
#[must_use]
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Samples one agent's session and feeds the lifecycle state machine.
pub struct LivenessMonitor {
    agent_id: String,
    session_name: String,
    mux: Arc<dyn Multiplexer>,
    lifecycle: Arc<LifecycleStateMachine>,
    baselines: IdleBaselineRepo,
    tracker: IdleTracker,
    restored: bool,
    scratch: String,
    interval: Duration,
}

impl LivenessMonitor {
    /// Construct a monitor for `agent_id` hosted in `session_name`.
    #[must_use]
    pub fn new(
        agent_id: String,
        session_name: String,
        mux: Arc<dyn Multiplexer>,
        lifecycle: Arc<LifecycleStateMachine>,
        baselines: IdleBaselineRepo,
        idle_samples: u32,
        interval: Duration,
    ) -> Self {
        Self {
            agent_id,
            session_name,
            mux,
            lifecycle,
            baselines,
            tracker: IdleTracker::new(idle_samples),
            restored: false,
            scratch: String::new(),
            interval,
        }
    }

    /// Take one sample of the session.
    pub async fn sample(&mut self) -> Observation {
        match self.mux.has_session(&self.session_name).await {
            Ok(false) => return Observation::Missing,
            Ok(true) => {}
            Err(err) => return Observation::Error(err.to_string()),
        }

        match self.mux.capture_pane(&self.session_name).await {
            Ok(text) => {
                self.scratch.clear();
                self.scratch.push_str(&text);
                Observation::Pane {
                    hash: content_hash(&self.scratch),
                }
            }
            Err(err) => Observation::Error(err.to_string()),
        }
    }

    /// Sample once and return the inferred status without persisting it.
    pub async fn check(&mut self) -> AgentStatus {
        let observation = self.sample().await;
        if let Observation::Error(ref err) = observation {
            warn!(agent_id = %self.agent_id, %err, "liveness check failed");
        }
        let status = self.tracker.observe(&observation);
        debug!(agent_id = %self.agent_id, ?observation, %status, "liveness sample");
        status
    }

    /// Check once, apply the result, and return the current record.
    ///
    /// Records still `Preparing` (launch in progress) or already terminal
    /// are returned as-is without sampling.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or `AppError::Db`.
    pub async fn ping_once(&mut self) -> Result<AgentRecord> {
        let record = self.lifecycle.get(&self.agent_id).await?;
        if record.status.is_terminal() || record.status == AgentStatus::Preparing {
            return Ok(record);
        }

        if !self.restored {
            if let Some(baseline) = self.baselines.load(&self.agent_id).await? {
                debug!(agent_id = %self.agent_id, ?baseline, "restored idle baseline");
                self.tracker.restore(baseline);
            }
            self.restored = true;
        }

        let status = self.check().await;
        let transition = self.lifecycle.observe(&self.agent_id, status).await?;
        if transition.record.status.is_terminal() {
            self.baselines.clear(&self.agent_id).await?;
        } else {
            self.baselines
                .save(&self.agent_id, self.tracker.baseline())
                .await?;
        }
        Ok(transition.record)
    }

    /// Check on a fixed interval until the agent is terminal or `cancel` fires.
    ///
    /// On cancellation the current record is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or `AppError::Db`.
    pub async fn watch_until_terminal(&mut self, cancel: &CancellationToken) -> Result<AgentRecord> {
        let span = info_span!("watch", agent_id = %self.agent_id);
        self.watch_loop(cancel).instrument(span).await
    }

    async fn watch_loop(&mut self, cancel: &CancellationToken) -> Result<AgentRecord> {
        loop {
            let record = self.ping_once().await?;
            if record.status.is_terminal() {
                return Ok(record);
            }

            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("watch cancelled");
                    return self.lifecycle.get(&self.agent_id).await;
                }
                () = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
