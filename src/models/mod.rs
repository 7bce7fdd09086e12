//! Domain model module declarations.

pub mod agent;
pub mod codebase;
pub mod event;
pub mod launch;
