//! Codebase lookup for `SQLite` persistence.

use std::path::PathBuf;
use std::sync::Arc;

use crate::models::codebase::Codebase;
use crate::{AppError, Result};

use super::db::Database;

/// Repository wrapper around `SQLite` for codebase references.
#[derive(Clone)]
pub struct CodebaseRepo {
    db: Arc<Database>,
}

#[derive(sqlx::FromRow)]
struct CodebaseRow {
    id: String,
    path: String,
}

impl CodebaseRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Register or replace a codebase.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the upsert fails.
    pub async fn upsert(&self, codebase: &Codebase) -> Result<()> {
        sqlx::query(
            "INSERT INTO codebase (id, path) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET path = excluded.path",
        )
        .bind(&codebase.id)
        .bind(codebase.path.to_string_lossy().as_ref())
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }

    /// Resolve a codebase by identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for unknown ids, `AppError::Db` on query failure.
    pub async fn resolve(&self, id: &str) -> Result<Codebase> {
        let row: Option<CodebaseRow> = sqlx::query_as("SELECT id, path FROM codebase WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.db.as_ref())
            .await?;

        row.map(|r| Codebase {
            id: r.id,
            path: PathBuf::from(r.path),
        })
        .ok_or_else(|| AppError::NotFound(format!("codebase {id} not found")))
    }
}
