#![forbid(unsafe_code)]

//! Supervision engine for coding-agent processes running in tmux sessions.

pub mod config;
pub mod errors;
pub mod models;
pub mod multiplexer;
pub mod orchestrator;
pub mod persistence;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
