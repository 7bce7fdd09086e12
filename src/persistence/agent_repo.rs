//! Agent record repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::models::agent::{AgentRecord, AgentStatus};
use crate::{AppError, Result};

use super::db::Database;

/// Repository wrapper around `SQLite` for agent records.
#[derive(Clone)]
pub struct AgentRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct AgentRow {
    id: String,
    execution_id: String,
    role: String,
    prompt: String,
    model: Option<String>,
    status: String,
    session_name: String,
    log_file: Option<String>,
    session_id: Option<String>,
    pid: Option<i64>,
    context: Option<String>,
    created_at: String,
    updated_at: String,
}

impl AgentRow {
    /// Convert a database row into the domain model.
    fn into_record(self) -> Result<AgentRecord> {
        let context = self
            .context
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| AppError::Db(format!("invalid context: {e}")))?;

        Ok(AgentRecord {
            status: self.status.parse()?,
            created_at: parse_timestamp(&self.created_at, "created_at")?,
            updated_at: parse_timestamp(&self.updated_at, "updated_at")?,
            id: self.id,
            execution_id: self.execution_id,
            role: self.role,
            prompt: self.prompt,
            model: self.model,
            session_name: self.session_name,
            log_file: self.log_file,
            session_id: self.session_id,
            pid: self.pid,
            context,
        })
    }
}

/// Format a timestamp with fixed precision so text ordering matches time ordering.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| AppError::Db(format!("invalid {field}: {e}")))
}

impl AgentRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new agent record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn create(&self, record: &AgentRecord) -> Result<AgentRecord> {
        let context = record
            .context
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| AppError::Db(format!("serialize context: {e}")))?;

        sqlx::query(
            "INSERT INTO agent (id, execution_id, role, prompt, model, status,
             session_name, log_file, session_id, pid, context, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )
        .bind(&record.id)
        .bind(&record.execution_id)
        .bind(&record.role)
        .bind(&record.prompt)
        .bind(&record.model)
        .bind(record.status.as_str())
        .bind(&record.session_name)
        .bind(&record.log_file)
        .bind(&record.session_id)
        .bind(record.pid)
        .bind(&context)
        .bind(format_timestamp(record.created_at))
        .bind(format_timestamp(record.updated_at))
        .execute(self.db.as_ref())
        .await?;

        Ok(record.clone())
    }

    /// Retrieve an agent by identifier.
    ///
    /// Returns `Ok(None)` if the agent does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<AgentRecord>> {
        let row: Option<AgentRow> = sqlx::query_as("SELECT * FROM agent WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.db.as_ref())
            .await?;

        row.map(AgentRow::into_record).transpose()
    }

    /// Retrieve an agent by identifier, failing if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for unknown ids, `AppError::Db` on query failure.
    pub async fn require(&self, id: &str) -> Result<AgentRecord> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("agent {id} not found")))
    }

    /// List agents currently in `status`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_by_status(&self, status: AgentStatus) -> Result<Vec<AgentRecord>> {
        let rows: Vec<AgentRow> =
            sqlx::query_as("SELECT * FROM agent WHERE status = ?1 ORDER BY created_at ASC")
                .bind(status.as_str())
                .fetch_all(self.db.as_ref())
                .await?;

        rows.into_iter().map(AgentRow::into_record).collect()
    }

    /// List every agent of an execution, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_by_execution(&self, execution_id: &str) -> Result<Vec<AgentRecord>> {
        let rows: Vec<AgentRow> =
            sqlx::query_as("SELECT * FROM agent WHERE execution_id = ?1 ORDER BY created_at ASC")
                .bind(execution_id)
                .fetch_all(self.db.as_ref())
                .await?;

        rows.into_iter().map(AgentRow::into_record).collect()
    }

    /// Move an agent from `from` to `to` if it is still in `from`.
    ///
    /// Returns `true` when this call performed the update. A `false`
    /// result means another caller changed the status first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn compare_and_set_status(
        &self,
        id: &str,
        from: AgentStatus,
        to: AgentStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE agent SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
        )
        .bind(to.as_str())
        .bind(format_timestamp(Utc::now()))
        .bind(id)
        .bind(from.as_str())
        .execute(self.db.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Attach the discovered transcript file and agent session id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn set_log(&self, id: &str, log_file: &str, session_id: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE agent SET log_file = ?1, session_id = ?2, updated_at = ?3 WHERE id = ?4")
            .bind(log_file)
            .bind(session_id)
            .bind(format_timestamp(Utc::now()))
            .bind(id)
            .execute(self.db.as_ref())
            .await?;

        Ok(())
    }

    /// Record the pane process id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn set_pid(&self, id: &str, pid: i64) -> Result<()> {
        sqlx::query("UPDATE agent SET pid = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(pid)
            .bind(format_timestamp(Utc::now()))
            .bind(id)
            .execute(self.db.as_ref())
            .await?;

        Ok(())
    }

    /// Store the parsed transcript summary.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if serialization or the update fails.
    pub async fn set_context(&self, id: &str, context: &serde_json::Value) -> Result<()> {
        let text = serde_json::to_string(context)
            .map_err(|e| AppError::Db(format!("serialize context: {e}")))?;

        sqlx::query("UPDATE agent SET context = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(text)
            .bind(format_timestamp(Utc::now()))
            .bind(id)
            .execute(self.db.as_ref())
            .await?;

        Ok(())
    }
}
