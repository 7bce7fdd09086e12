//! Append-only event store for `SQLite` persistence.

use std::sync::Arc;

use crate::models::event::{Event, EventKind};
use crate::{AppError, Result};

use super::agent_repo::{format_timestamp, parse_timestamp};
use super::db::Database;

/// Repository wrapper around `SQLite` for lifecycle events.
///
/// Exposes no update or delete operations.
#[derive(Clone)]
pub struct EventRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct EventRow {
    id: String,
    parent_id: Option<String>,
    agent_id: String,
    kind: String,
    data: String,
    timestamp: String,
}

impl EventRow {
    fn into_event(self) -> Result<Event> {
        let data = serde_json::from_str(&self.data)
            .map_err(|e| AppError::Db(format!("invalid event data: {e}")))?;
        Ok(Event {
            kind: self.kind.parse()?,
            timestamp: parse_timestamp(&self.timestamp, "timestamp")?,
            id: self.id,
            parent_id: self.parent_id,
            agent_id: self.agent_id,
            data,
        })
    }
}

const EVENT_COLUMNS: &str = "id, parent_id, agent_id, kind, data, timestamp";

impl EventRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append an event.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if serialization or the insert fails.
    pub async fn append(&self, event: &Event) -> Result<Event> {
        let data = serde_json::to_string(&event.data)
            .map_err(|e| AppError::Db(format!("serialize event data: {e}")))?;

        sqlx::query(
            "INSERT INTO agent_event (id, parent_id, agent_id, kind, data, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&event.id)
        .bind(&event.parent_id)
        .bind(&event.agent_id)
        .bind(event.kind.as_str())
        .bind(data)
        .bind(format_timestamp(event.timestamp))
        .execute(self.db.as_ref())
        .await?;

        Ok(event.clone())
    }

    /// Full event trail of one agent in emission order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_for_agent(&self, agent_id: &str) -> Result<Vec<Event>> {
        let query = format!(
            "SELECT {EVENT_COLUMNS} FROM agent_event WHERE agent_id = ?1 \
             ORDER BY timestamp ASC, seq ASC"
        );
        let rows: Vec<EventRow> = sqlx::query_as(&query)
            .bind(agent_id)
            .fetch_all(self.db.as_ref())
            .await?;

        rows.into_iter().map(EventRow::into_event).collect()
    }

    /// Events of one agent with the given kind, in emission order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_for_agent_by_kind(
        &self,
        agent_id: &str,
        kind: EventKind,
    ) -> Result<Vec<Event>> {
        let query = format!(
            "SELECT {EVENT_COLUMNS} FROM agent_event WHERE agent_id = ?1 AND kind = ?2 \
             ORDER BY timestamp ASC, seq ASC"
        );
        let rows: Vec<EventRow> = sqlx::query_as(&query)
            .bind(agent_id)
            .bind(kind.as_str())
            .fetch_all(self.db.as_ref())
            .await?;

        rows.into_iter().map(EventRow::into_event).collect()
    }

    /// Most recent event of one agent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn latest_for_agent(&self, agent_id: &str) -> Result<Option<Event>> {
        let query = format!(
            "SELECT {EVENT_COLUMNS} FROM agent_event WHERE agent_id = ?1 \
             ORDER BY timestamp DESC, seq DESC LIMIT 1"
        );
        let row: Option<EventRow> = sqlx::query_as(&query)
            .bind(agent_id)
            .fetch_optional(self.db.as_ref())
            .await?;

        row.map(EventRow::into_event).transpose()
    }

    /// Most recent events across all agents, newest last.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_recent(&self, limit: u32) -> Result<Vec<Event>> {
        let query = format!(
            "SELECT {EVENT_COLUMNS} FROM (SELECT * FROM agent_event \
             ORDER BY timestamp DESC, seq DESC LIMIT ?1) ORDER BY timestamp ASC, seq ASC"
        );
        let rows: Vec<EventRow> = sqlx::query_as(&query)
            .bind(i64::from(limit))
            .fetch_all(self.db.as_ref())
            .await?;

        rows.into_iter().map(EventRow::into_event).collect()
    }
}
