//! Agent lifecycle state machine.
//!
//! Owns agent records and the event stream. Every status change goes
//! through [`LifecycleStateMachine::transition`], which validates the move,
//! persists it with a compare-and-set update, and emits exactly one event.
//! Transitions of one agent are serialised by a per-agent lock so its
//! events are appended in the order the transitions happened.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use super::terminator::{KillMethod, Terminator};
use super::transcript;
use crate::models::agent::{AgentRecord, AgentStatus};
use crate::models::event::{Event, EventKind};
use crate::models::launch::LaunchRequest;
use crate::persistence::agent_repo::AgentRepo;
use crate::persistence::db::Database;
use crate::persistence::event_repo::EventRepo;
use crate::{AppError, Result};

/// Whether reaching a terminal state should tear down the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// Kill the session and record `SessionTerminated`.
    Kill,
    /// Leave the session alone (never started, or already killed).
    Skip,
}

/// Outcome of a transition request.
#[derive(Debug, Clone)]
pub struct Transition {
    /// Record after the request was applied.
    pub record: AgentRecord,
    /// Status before the change, when a change happened.
    pub previous: Option<AgentStatus>,
}

impl Transition {
    /// Whether the request changed the status.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.previous.is_some()
    }
}

/// Result of an operator kill.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KillReport {
    /// Agent the kill was addressed to.
    pub agent_id: String,
    /// How the session was killed.
    pub kill_method: KillMethod,
    /// Status after the kill.
    pub status: AgentStatus,
}

type AgentLocks = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Validated, event-sourced status changes for agent records.
pub struct LifecycleStateMachine {
    agents: AgentRepo,
    events: EventRepo,
    terminator: Terminator,
    locks: AgentLocks,
}

impl LifecycleStateMachine {
    /// Construct a state machine over `db`.
    #[must_use]
    pub fn new(db: Arc<Database>, terminator: Terminator) -> Self {
        Self {
            agents: AgentRepo::new(Arc::clone(&db)),
            events: EventRepo::new(db),
            terminator,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Agent record store.
    #[must_use]
    pub fn agents(&self) -> &AgentRepo {
        &self.agents
    }

    /// Event store.
    #[must_use]
    pub fn events(&self) -> &EventRepo {
        &self.events
    }

    /// Load an agent, failing with `NotFound` for unknown ids.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or `AppError::Db`.
    pub async fn get(&self, agent_id: &str) -> Result<AgentRecord> {
        self.agents.require(agent_id).await
    }

    /// Create a `Preparing` record for `request` and emit `Preparing`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if persistence fails.
    pub async fn create(&self, request: &LaunchRequest) -> Result<AgentRecord> {
        let record = AgentRecord::new(
            request.execution_id.clone(),
            request.role.clone(),
            request.prompt.clone(),
            request.model.clone(),
        );
        let created = self.agents.create(&record).await?;

        self.record_event(
            &created.id,
            EventKind::Preparing,
            json!({
                "status": AgentStatus::Preparing,
                "executionId": created.execution_id,
                "role": created.role,
                "model": created.model,
                "sessionName": created.session_name,
            }),
        )
        .await?;

        info!(agent_id = %created.id, session_name = %created.session_name, "agent record created");
        Ok(created)
    }

    /// Append a non-status event, chained to the agent's latest event.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if persistence fails.
    pub async fn record_event(&self, agent_id: &str, kind: EventKind, data: Value) -> Result<Event> {
        let lock = self.lock_for(agent_id)?;
        let appended = {
            let _held = lock.lock().await;
            self.append(agent_id, kind, data).await
        };
        self.release_lock(agent_id, lock);
        appended
    }

    /// Feed a status computed by the liveness monitor.
    ///
    /// Unchanged statuses and observations on terminal records are no-ops.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or `AppError::Db`.
    pub async fn observe(&self, agent_id: &str, observed: AgentStatus) -> Result<Transition> {
        self.transition(agent_id, observed, Value::Null, Teardown::Kill)
            .await
    }

    /// Move an agent to `Failed` with `reason`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or `AppError::Db`.
    pub async fn fail(&self, agent_id: &str, reason: &str, teardown: Teardown) -> Result<Transition> {
        self.transition(
            agent_id,
            AgentStatus::Failed,
            json!({ "reason": reason }),
            teardown,
        )
        .await
    }

    /// Request a status change.
    ///
    /// `detail` (an object, or `null`) is merged into the event payload
    /// next to `status` and `previousStatus`. Terminal teardown runs while
    /// the agent lock is still held, so no other request for the same agent
    /// can observe the session between the status change and the kill.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or `AppError::Db`.
    pub async fn transition(
        &self,
        agent_id: &str,
        next: AgentStatus,
        detail: Value,
        teardown: Teardown,
    ) -> Result<Transition> {
        let lock = self.lock_for(agent_id)?;
        let outcome = {
            let _held = lock.lock().await;
            self.transition_locked(agent_id, next, detail, teardown)
                .await
        };
        self.release_lock(agent_id, lock);
        outcome
    }

    /// Kill an agent on operator request.
    ///
    /// Runs the terminator for a live record, records `ManuallyKilled`,
    /// and moves the record to `Failed`. Records that are already terminal
    /// have no session left to kill and keep their status. The agent lock
    /// is held throughout, so a monitor sampling the dying session only
    /// sees the record once it is `Failed`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or `AppError::Db`.
    pub async fn kill(&self, agent_id: &str) -> Result<KillReport> {
        let lock = self.lock_for(agent_id)?;
        let outcome = {
            let _held = lock.lock().await;
            self.kill_locked(agent_id).await
        };
        self.release_lock(agent_id, lock);
        let report = outcome?;

        info!(agent_id, kill_method = %report.kill_method, status = %report.status, "agent killed");
        Ok(report)
    }

    /// Attach the discovered transcript and emit `LogDiscovered`.
    ///
    /// When the agent already reached a terminal state, the transcript
    /// context is captured right away.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if persistence fails.
    pub async fn attach_log(
        &self,
        agent_id: &str,
        log_file: &str,
        session_id: Option<&str>,
    ) -> Result<Event> {
        let lock = self.lock_for(agent_id)?;
        let outcome = {
            let _held = lock.lock().await;
            self.attach_log_locked(agent_id, log_file, session_id)
                .await
        };
        self.release_lock(agent_id, lock);
        outcome
    }

    async fn transition_locked(
        &self,
        agent_id: &str,
        next: AgentStatus,
        detail: Value,
        teardown: Teardown,
    ) -> Result<Transition> {
        let applied = self.apply_locked(agent_id, next, detail).await?;
        let Some(previous) = applied.previous else {
            return Ok(applied);
        };
        if !next.is_terminal() {
            return Ok(applied);
        }

        self.finish_locked(&applied.record, previous, teardown)
            .await;
        Ok(Transition {
            record: self.agents.require(agent_id).await?,
            previous: Some(previous),
        })
    }

    async fn kill_locked(&self, agent_id: &str) -> Result<KillReport> {
        let record = self.agents.require(agent_id).await?;
        let kill_method = if record.status.is_terminal() {
            KillMethod::None
        } else {
            self.terminator.terminate(&record.session_name).await
        };

        self.append(
            agent_id,
            EventKind::ManuallyKilled,
            json!({ "killMethod": kill_method, "status": record.status }),
        )
        .await?;

        let transition = self
            .transition_locked(
                agent_id,
                AgentStatus::Failed,
                json!({ "reason": "manually killed" }),
                Teardown::Skip,
            )
            .await?;

        Ok(KillReport {
            agent_id: agent_id.to_owned(),
            kill_method,
            status: transition.record.status,
        })
    }

    async fn attach_log_locked(
        &self,
        agent_id: &str,
        log_file: &str,
        session_id: Option<&str>,
    ) -> Result<Event> {
        self.agents.set_log(agent_id, log_file, session_id).await?;
        let event = self
            .append(
                agent_id,
                EventKind::LogDiscovered,
                json!({ "logFile": log_file, "sessionId": session_id }),
            )
            .await?;

        let record = self.agents.require(agent_id).await?;
        if record.status.is_terminal() {
            self.capture_context(&record).await;
        }
        Ok(event)
    }

    async fn apply_locked(
        &self,
        agent_id: &str,
        next: AgentStatus,
        detail: Value,
    ) -> Result<Transition> {
        loop {
            let current = self.agents.require(agent_id).await?;

            if current.status == next || current.status.is_terminal() {
                debug!(agent_id, status = %current.status, observed = %next, "no transition");
                return Ok(Transition {
                    record: current,
                    previous: None,
                });
            }

            if !current.status.can_transition_to(next) {
                warn!(agent_id, from = %current.status, to = %next, "rejected invalid transition");
                return Ok(Transition {
                    record: current,
                    previous: None,
                });
            }

            let swapped = self
                .agents
                .compare_and_set_status(agent_id, current.status, next)
                .await?;
            if !swapped {
                // Changed underneath us; re-read and re-evaluate.
                continue;
            }

            let mut data = json!({ "status": next, "previousStatus": current.status });
            if let (Value::Object(target), Value::Object(extra)) = (&mut data, detail) {
                for (key, value) in extra {
                    target.entry(key).or_insert(value);
                }
            }
            self.append(agent_id, EventKind::for_status(next), data)
                .await?;

            info!(agent_id, from = %current.status, to = %next, "status transition");
            let record = self.agents.require(agent_id).await?;
            return Ok(Transition {
                record,
                previous: Some(current.status),
            });
        }
    }

    async fn finish_locked(&self, record: &AgentRecord, previous: AgentStatus, teardown: Teardown) {
        if teardown == Teardown::Kill {
            let kill_method = self.terminator.terminate(&record.session_name).await;
            if let Err(err) = self
                .append(
                    &record.id,
                    EventKind::SessionTerminated,
                    json!({ "killMethod": kill_method, "status": record.status }),
                )
                .await
            {
                warn!(agent_id = %record.id, %err, "failed to record session teardown");
            }
        }

        self.capture_context(record).await;
        info!(agent_id = %record.id, %previous, status = %record.status, "agent reached terminal state");
    }

    async fn capture_context(&self, record: &AgentRecord) {
        let Some(ref log_file) = record.log_file else {
            return;
        };
        match transcript::load_context(std::path::Path::new(log_file)).await {
            Ok(context) => {
                if let Err(err) = self.agents.set_context(&record.id, &context).await {
                    warn!(agent_id = %record.id, %err, "failed to store transcript context");
                }
            }
            Err(err) => warn!(agent_id = %record.id, %err, "failed to read transcript"),
        }
    }

    async fn append(&self, agent_id: &str, kind: EventKind, data: Value) -> Result<Event> {
        let parent_id = self
            .events
            .latest_for_agent(agent_id)
            .await?
            .map(|event| event.id);
        let event = Event::new(agent_id.to_owned(), kind, data, parent_id);
        self.events.append(&event).await
    }

    fn lock_for(&self, agent_id: &str) -> Result<Arc<AsyncMutex<()>>> {
        let mut guard = self
            .locks
            .lock()
            .map_err(|_| AppError::Db("agent lock table poisoned".into()))?;
        Ok(Arc::clone(guard.entry(agent_id.to_owned()).or_default()))
    }

    /// Drop the agent's lock entry once no request holds it.
    fn release_lock(&self, agent_id: &str, lock: Arc<AsyncMutex<()>>) {
        drop(lock);
        if let Ok(mut guard) = self.locks.lock() {
            if guard
                .get(agent_id)
                .is_some_and(|entry| Arc::strong_count(entry) == 1)
            {
                guard.remove(agent_id);
            }
        }
    }
}
