//! Unit tests for the pure idle-detection transition function.

use agent_warden::models::agent::{AgentStatus, IdleBaseline};
use agent_warden::orchestrator::liveness::{content_hash, IdleTracker, Observation};

fn pane(text: &str) -> Observation {
    Observation::Pane {
        hash: content_hash(text),
    }
}

#[test]
fn first_sample_is_running_and_sets_baseline() {
    let mut tracker = IdleTracker::new(1);
    assert_eq!(tracker.last_hash(), None);

    assert_eq!(tracker.observe(&pane("hello")), AgentStatus::Running);
    assert_eq!(tracker.last_hash(), Some(content_hash("hello").as_str()));
}

#[test]
fn unchanged_sample_completes_with_default_threshold() {
    let mut tracker = IdleTracker::new(1);
    tracker.observe(&pane("same"));

    assert_eq!(tracker.observe(&pane("same")), AgentStatus::Completed);
}

#[test]
fn changed_sample_resets_idle_count() {
    let mut tracker = IdleTracker::new(2);

    assert_eq!(tracker.observe(&pane("a")), AgentStatus::Running);
    assert_eq!(tracker.observe(&pane("a")), AgentStatus::Running);
    assert_eq!(tracker.observe(&pane("b")), AgentStatus::Running);
    assert_eq!(tracker.observe(&pane("b")), AgentStatus::Running);
    assert_eq!(tracker.observe(&pane("b")), AgentStatus::Completed);
    assert_eq!(tracker.last_hash(), Some(content_hash("b").as_str()));
}

#[test]
fn missing_session_and_errors_fail() {
    let mut tracker = IdleTracker::new(1);
    assert_eq!(tracker.observe(&Observation::Missing), AgentStatus::Failed);
    assert_eq!(
        tracker.observe(&Observation::Error("capture failed".into())),
        AgentStatus::Failed
    );
    // Failures do not disturb the baseline.
    assert_eq!(tracker.last_hash(), None);
}

#[test]
fn zero_threshold_is_treated_as_one() {
    let mut tracker = IdleTracker::new(0);
    tracker.observe(&pane("x"));
    assert_eq!(tracker.observe(&pane("x")), AgentStatus::Completed);
}

#[test]
fn restored_baseline_continues_the_count() {
    let mut earlier = IdleTracker::new(2);
    earlier.observe(&pane("prompt"));
    earlier.observe(&pane("prompt"));
    assert_eq!(
        earlier.baseline(),
        &IdleBaseline {
            last_hash: Some(content_hash("prompt")),
            unchanged: 1,
        }
    );

    let mut resumed = IdleTracker::new(2);
    resumed.restore(earlier.baseline().clone());
    assert_eq!(resumed.observe(&pane("prompt")), AgentStatus::Completed);
}

#[test]
fn content_hash_is_sha256_hex() {
    assert_eq!(
        content_hash(""),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
    assert_ne!(content_hash("a"), content_hash("a "));
}
