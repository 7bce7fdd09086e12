//! Supervision facade.
//!
//! Wires the launcher, lifecycle state machine, liveness monitors and
//! callback notifier together and exposes the caller-facing flows:
//! launch, launch-and-wait, start-and-notify, ping, watch and kill.
//! Each agent's supervision runs as its own task; monitors are kept per
//! agent id and dropped once the agent is terminal.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use super::callback::{CallbackNotifier, CallbackOutcome, CallbackPayload};
use super::launcher::{Launched, SessionLauncher};
use super::lifecycle::{KillReport, LifecycleStateMachine};
use super::liveness::LivenessMonitor;
use super::terminator::Terminator;
use crate::config::GlobalConfig;
use crate::models::agent::{AgentRecord, AgentStatus};
use crate::models::codebase::Codebase;
use crate::models::event::Event;
use crate::models::launch::{LaunchRequest, LaunchResult};
use crate::multiplexer::Multiplexer;
use crate::persistence::baseline_repo::IdleBaselineRepo;
use crate::persistence::codebase_repo::CodebaseRepo;
use crate::persistence::db::Database;
use crate::{AppError, Result};

type MonitorSlot = Arc<AsyncMutex<LivenessMonitor>>;

/// Handle to a running start-and-notify flow.
pub struct NotifyHandle {
    /// Identifiers returned as soon as the launch is verified.
    pub launch: LaunchResult,
    /// Completes after the callback attempt has been recorded.
    pub task: JoinHandle<Result<CallbackOutcome>>,
}

/// Caller-facing supervision engine.
pub struct Supervisor {
    config: Arc<GlobalConfig>,
    mux: Arc<dyn Multiplexer>,
    lifecycle: Arc<LifecycleStateMachine>,
    launcher: SessionLauncher,
    notifier: CallbackNotifier,
    codebases: CodebaseRepo,
    baselines: IdleBaselineRepo,
    monitors: Mutex<HashMap<String, MonitorSlot>>,
}

impl Supervisor {
    /// Build the engine over a database pool and a multiplexer.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP client cannot be built.
    pub fn new(
        config: Arc<GlobalConfig>,
        db: Arc<Database>,
        mux: Arc<dyn Multiplexer>,
    ) -> Result<Arc<Self>> {
        let terminator = Terminator::new(
            Arc::clone(&mux),
            config.terminate.kill_server_fallback,
        );
        let lifecycle = Arc::new(LifecycleStateMachine::new(Arc::clone(&db), terminator));
        let baselines = IdleBaselineRepo::new(Arc::clone(&db));
        let codebases = CodebaseRepo::new(db);
        let launcher = SessionLauncher::new(
            Arc::clone(&mux),
            Arc::clone(&lifecycle),
            codebases.clone(),
            Arc::clone(&config),
        );
        let notifier = CallbackNotifier::new(Arc::clone(&lifecycle), config.callback_timeout())?;

        Ok(Arc::new(Self {
            config,
            mux,
            lifecycle,
            launcher,
            notifier,
            codebases,
            baselines,
            monitors: Mutex::new(HashMap::new()),
        }))
    }

    /// Lifecycle state machine backing this engine.
    #[must_use]
    pub fn lifecycle(&self) -> &Arc<LifecycleStateMachine> {
        &self.lifecycle
    }

    /// Register or replace a codebase agents can be launched in.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if persistence fails.
    pub async fn register_codebase(&self, codebase: &Codebase) -> Result<()> {
        self.codebases.upsert(codebase).await
    }

    /// Launch an agent and return once its session is verified.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation`, `AppError::NotFound`, or `AppError::Process`.
    pub async fn launch(&self, request: &LaunchRequest) -> Result<Launched> {
        self.launcher.launch(request).await
    }

    /// Launch an agent and hold until it reaches a terminal state.
    ///
    /// Cancelling `cancel` stops the watch and returns the record as it is.
    ///
    /// # Errors
    ///
    /// Returns launch errors, or `AppError::Db` while watching.
    pub async fn launch_and_wait(
        &self,
        request: &LaunchRequest,
        cancel: &CancellationToken,
    ) -> Result<AgentRecord> {
        let launched = self.launch(request).await?;
        self.watch(&launched.result.agent_id, cancel).await
    }

    /// Launch an agent, then watch it and post the final state to `callback_url`
    /// on a background task.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for malformed URLs and any launch error.
    pub async fn start_and_notify(
        self: &Arc<Self>,
        request: &LaunchRequest,
        callback_url: &str,
        cancel: CancellationToken,
    ) -> Result<NotifyHandle> {
        let url = reqwest::Url::parse(callback_url)
            .map_err(|err| AppError::Validation(format!("invalid callback url: {err}")))?;

        let launched = self.launch(request).await?;
        let launch = launched.result.clone();
        let engine = Arc::clone(self);
        let span = info_span!("notify_flow", agent_id = %launch.agent_id);

        let task = tokio::spawn(
            async move { engine.watch_and_notify(&launched.result, &url, &cancel).await }
                .instrument(span),
        );

        Ok(NotifyHandle { launch, task })
    }

    async fn watch_and_notify(
        &self,
        launch: &LaunchResult,
        url: &reqwest::Url,
        cancel: &CancellationToken,
    ) -> Result<CallbackOutcome> {
        let record = self.watch(&launch.agent_id, cancel).await?;
        if !record.status.is_terminal() {
            info!(status = %record.status, "watch cancelled; skipping callback");
            return Err(AppError::Callback(
                "watch cancelled before a terminal state".into(),
            ));
        }
        let payload = CallbackPayload::merge(launch, &record);
        self.notifier.notify(url.as_str(), &payload).await
    }

    /// Sample an agent once and return its record.
    ///
    /// While a watch loop owns the agent's monitor, the persisted record is
    /// returned without sampling.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or `AppError::Db`.
    pub async fn ping(&self, agent_id: &str) -> Result<AgentRecord> {
        let record = self.lifecycle.get(agent_id).await?;
        if record.status.is_terminal() {
            self.forget_monitor(agent_id);
            return Ok(record);
        }

        let slot = self.monitor_for(&record)?;
        let Ok(mut monitor) = slot.try_lock() else {
            return Ok(record);
        };
        let record = monitor.ping_once().await?;
        drop(monitor);

        if record.status.is_terminal() {
            self.forget_monitor(agent_id);
        }
        Ok(record)
    }

    /// Watch an agent until it is terminal or `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or `AppError::Db`.
    pub async fn watch(&self, agent_id: &str, cancel: &CancellationToken) -> Result<AgentRecord> {
        let record = self.lifecycle.get(agent_id).await?;
        if record.status.is_terminal() {
            self.forget_monitor(agent_id);
            return Ok(record);
        }

        let slot = self.monitor_for(&record)?;
        let mut monitor = slot.lock().await;
        let record = monitor.watch_until_terminal(cancel).await?;
        drop(monitor);

        if record.status.is_terminal() {
            self.forget_monitor(agent_id);
        }
        Ok(record)
    }

    /// Kill an agent on operator request.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or `AppError::Db`.
    pub async fn kill(&self, agent_id: &str) -> Result<KillReport> {
        let report = self.lifecycle.kill(agent_id).await?;
        self.forget_monitor(agent_id);
        Ok(report)
    }

    /// Load an agent record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or `AppError::Db`.
    pub async fn agent(&self, agent_id: &str) -> Result<AgentRecord> {
        self.lifecycle.get(agent_id).await
    }

    /// List agents in `status`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list(&self, status: AgentStatus) -> Result<Vec<AgentRecord>> {
        self.lifecycle.agents().list_by_status(status).await
    }

    /// Event trail of an agent in emission order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or `AppError::Db`.
    pub async fn events(&self, agent_id: &str) -> Result<Vec<Event>> {
        self.lifecycle.get(agent_id).await?;
        self.lifecycle.events().list_for_agent(agent_id).await
    }

    /// Most recent events across all agents, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn recent_events(&self, limit: u32) -> Result<Vec<Event>> {
        self.lifecycle.events().list_recent(limit).await
    }

    fn monitor_for(&self, record: &AgentRecord) -> Result<MonitorSlot> {
        let mut guard = self
            .monitors
            .lock()
            .map_err(|_| AppError::Session("monitor table poisoned".into()))?;
        let slot = guard.entry(record.id.clone()).or_insert_with(|| {
            Arc::new(AsyncMutex::new(LivenessMonitor::new(
                record.id.clone(),
                record.session_name.clone(),
                Arc::clone(&self.mux),
                Arc::clone(&self.lifecycle),
                self.baselines.clone(),
                self.config.monitor.idle_samples,
                self.config.monitor_interval(),
            )))
        });
        Ok(Arc::clone(slot))
    }

    fn forget_monitor(&self, agent_id: &str) {
        match self.monitors.lock() {
            Ok(mut guard) => {
                guard.remove(agent_id);
            }
            Err(_) => warn!(agent_id, "monitor table poisoned"),
        }
    }
}
