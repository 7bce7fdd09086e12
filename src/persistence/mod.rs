//! Persistence layer modules.

pub mod agent_repo;
pub mod baseline_repo;
pub mod codebase_repo;
pub mod db;
pub mod event_repo;
pub mod schema;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;
