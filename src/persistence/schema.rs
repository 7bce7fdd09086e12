//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE TABLE IF NOT EXISTS` and are
//! re-applied on every startup.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected `SQLite` database.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS agent (
    id              TEXT PRIMARY KEY NOT NULL,
    execution_id    TEXT NOT NULL,
    role            TEXT NOT NULL,
    prompt          TEXT NOT NULL,
    model           TEXT,
    status          TEXT NOT NULL CHECK(status IN ('preparing','launched','running','completed','failed')),
    session_name    TEXT NOT NULL UNIQUE,
    log_file        TEXT,
    session_id      TEXT,
    pid             INTEGER,
    context         TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS agent_event (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    id              TEXT NOT NULL UNIQUE,
    parent_id       TEXT,
    agent_id        TEXT NOT NULL,
    kind            TEXT NOT NULL,
    data            TEXT NOT NULL,
    timestamp       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS idle_baseline (
    agent_id        TEXT PRIMARY KEY NOT NULL,
    last_hash       TEXT,
    unchanged       INTEGER NOT NULL DEFAULT 0,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS codebase (
    id              TEXT PRIMARY KEY NOT NULL,
    path            TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_agent_status ON agent(status);
CREATE INDEX IF NOT EXISTS idx_agent_execution ON agent(execution_id);
CREATE INDEX IF NOT EXISTS idx_event_agent ON agent_event(agent_id, timestamp, seq);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
