//! Idle baseline repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::Utc;

use crate::models::agent::IdleBaseline;
use crate::{AppError, Result};

use super::agent_repo::format_timestamp;
use super::db::Database;

/// Repository wrapper around `SQLite` for per-agent idle baselines.
#[derive(Clone)]
pub struct IdleBaselineRepo {
    db: Arc<Database>,
}

#[derive(sqlx::FromRow)]
struct BaselineRow {
    last_hash: Option<String>,
    unchanged: i64,
}

impl BaselineRow {
    fn into_baseline(self) -> Result<IdleBaseline> {
        let unchanged = u32::try_from(self.unchanged)
            .map_err(|e| AppError::Db(format!("invalid unchanged count: {e}")))?;
        Ok(IdleBaseline {
            last_hash: self.last_hash,
            unchanged,
        })
    }
}

impl IdleBaselineRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Load the stored baseline of an agent, if any.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn load(&self, agent_id: &str) -> Result<Option<IdleBaseline>> {
        let row: Option<BaselineRow> = sqlx::query_as(
            "SELECT last_hash, unchanged FROM idle_baseline WHERE agent_id = ?1",
        )
        .bind(agent_id)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(BaselineRow::into_baseline).transpose()
    }

    /// Insert or replace the baseline of an agent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the upsert fails.
    pub async fn save(&self, agent_id: &str, baseline: &IdleBaseline) -> Result<()> {
        sqlx::query(
            "INSERT INTO idle_baseline (agent_id, last_hash, unchanged, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(agent_id) DO UPDATE SET last_hash = excluded.last_hash,
             unchanged = excluded.unchanged, updated_at = excluded.updated_at",
        )
        .bind(agent_id)
        .bind(&baseline.last_hash)
        .bind(i64::from(baseline.unchanged))
        .bind(format_timestamp(Utc::now()))
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }

    /// Drop the baseline of an agent that no longer needs sampling.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn clear(&self, agent_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM idle_baseline WHERE agent_id = ?1")
            .bind(agent_id)
            .execute(self.db.as_ref())
            .await?;

        Ok(())
    }
}
