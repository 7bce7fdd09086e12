//! Agent supervision engine.
//!
//! Covers session launch and startup verification, transcript discovery,
//! liveness/idleness monitoring, the lifecycle state machine, session
//! termination, and completion callbacks.

pub mod callback;
pub mod launcher;
pub mod lifecycle;
pub mod liveness;
pub mod log_discovery;
pub mod supervisor;
pub mod terminator;
pub mod transcript;

pub use supervisor::Supervisor;
