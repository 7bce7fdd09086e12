//! Transcript discovery by filesystem snapshot diffing.
//!
//! The agent CLI writes its transcript to an unpredictable path under a
//! known root. A snapshot of existing transcripts is taken before launch;
//! afterwards the root is re-walked until exactly one new file appears.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};
use walkdir::WalkDir;

use super::lifecycle::LifecycleStateMachine;
use crate::models::event::EventKind;
use crate::{AppError, Result};

static UUID_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}").ok()
});

/// Set of transcript files present under the log root at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSnapshot {
    files: BTreeSet<PathBuf>,
}

impl LogSnapshot {
    /// Recursively collect files under `root` with the given extension.
    ///
    /// A missing root yields an empty snapshot; unreadable entries are skipped.
    #[must_use]
    pub fn capture(root: &Path, extension: &str) -> Self {
        let files = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .path()
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
            })
            .map(walkdir::DirEntry::into_path)
            .collect();
        Self { files }
    }

    /// [`capture`](Self::capture) on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Discovery` if the blocking task panics.
    pub async fn capture_async(root: PathBuf, extension: String) -> Result<Self> {
        tokio::task::spawn_blocking(move || Self::capture(&root, &extension))
            .await
            .map_err(|err| AppError::Discovery(format!("log walk task failed: {err}")))
    }

    /// Files in `self` that are absent from `baseline`.
    #[must_use]
    pub fn new_since(&self, baseline: &Self) -> Vec<PathBuf> {
        self.files.difference(&baseline.files).cloned().collect()
    }

    /// Number of files in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the snapshot holds no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Extract the first 8-4-4-4-12 hex UUID from `path`, lowercased.
#[must_use]
pub fn extract_session_id(path: &Path) -> Option<String> {
    let pattern = UUID_PATTERN.as_ref()?;
    let text = path.to_string_lossy();
    pattern.find(&text).map(|m| m.as_str().to_ascii_lowercase())
}

/// Result of one discovery run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// Exactly one new transcript appeared.
    Found {
        /// Transcript path.
        log_file: PathBuf,
        /// UUID extracted from the path, if any.
        session_id: Option<String>,
    },
    /// The window elapsed with zero or several candidates.
    TimedOut {
        /// Candidates seen on the last walk.
        candidates: usize,
    },
}

/// Background transcript discovery for one agent.
pub struct LogDiscoverer {
    lifecycle: Arc<LifecycleStateMachine>,
    root: PathBuf,
    extension: String,
    poll: Duration,
    timeout: Duration,
}

impl LogDiscoverer {
    /// Construct a discoverer walking `root` for `extension` files.
    #[must_use]
    pub fn new(
        lifecycle: Arc<LifecycleStateMachine>,
        root: PathBuf,
        extension: String,
        poll: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            lifecycle,
            root,
            extension,
            poll,
            timeout,
        }
    }

    /// Snapshot the log root; call before starting the agent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Discovery` if the walk task fails.
    pub async fn snapshot(&self) -> Result<LogSnapshot> {
        let snapshot =
            LogSnapshot::capture_async(self.root.clone(), self.extension.clone()).await?;
        debug!(root = %self.root.display(), files = snapshot.len(), "log root snapshot");
        Ok(snapshot)
    }

    /// Re-walk until one new file appears or the window elapses.
    ///
    /// Records `LogDiscovered` or `LogDiscoveryFailed`. A timeout is not an
    /// error; it only means the transcript is not correlated.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the outcome cannot be persisted.
    pub async fn discover(&self, agent_id: &str, baseline: &LogSnapshot) -> Result<DiscoveryOutcome> {
        let started = tokio::time::Instant::now();
        let mut candidates;

        loop {
            let current = self.snapshot().await?;
            let fresh = current.new_since(baseline);
            candidates = fresh.len();

            if let [log_file] = fresh.as_slice() {
                let session_id = extract_session_id(log_file);
                let path_text = log_file.to_string_lossy();
                self.lifecycle
                    .attach_log(agent_id, &path_text, session_id.as_deref())
                    .await?;
                info!(log_file = %path_text, ?session_id, "transcript discovered");
                return Ok(DiscoveryOutcome::Found {
                    log_file: log_file.clone(),
                    session_id,
                });
            }

            debug!(candidates, "no unique transcript yet");
            if started.elapsed() >= self.timeout {
                break;
            }
            tokio::time::sleep(self.poll).await;
        }

        warn!(candidates, "transcript discovery timed out");
        self.lifecycle
            .record_event(
                agent_id,
                EventKind::LogDiscoveryFailed,
                json!({
                    "candidates": candidates,
                    "timeoutMs": u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                }),
            )
            .await?;
        Ok(DiscoveryOutcome::TimedOut { candidates })
    }

    /// Run [`discover`](Self::discover) on a background task.
    #[must_use]
    pub fn spawn(self, agent_id: String, baseline: LogSnapshot) -> JoinHandle<Option<DiscoveryOutcome>> {
        let span = info_span!("log_discovery", agent_id = %agent_id);
        tokio::spawn(
            async move {
                match self.discover(&agent_id, &baseline).await {
                    Ok(outcome) => Some(outcome),
                    Err(err) => {
                        warn!(%err, "transcript discovery aborted");
                        None
                    }
                }
            }
            .instrument(span),
        )
    }
}
