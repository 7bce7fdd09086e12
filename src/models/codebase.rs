//! Codebase reference model.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A registered working tree agents can be launched in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Codebase {
    /// Caller-chosen identifier.
    pub id: String,
    /// Absolute filesystem path.
    pub path: PathBuf,
}
