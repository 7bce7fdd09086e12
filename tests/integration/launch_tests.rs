//! Integration tests for launching agent sessions.
//!
//! Validates:
//! - verified launches emit `Preparing` then `Launched`, in order
//! - sessions that never appear leave a `Failed` record and no `Launched` event
//! - incomplete requests and unknown codebases create no record

use agent_warden::models::agent::AgentStatus;
use agent_warden::models::event::EventKind;
use agent_warden::AppError;

use super::test_helpers::{count, kinds, launch_request, test_config, test_supervisor, FakeMux};

#[tokio::test]
async fn verified_launch_emits_preparing_then_launched() {
    let logs = tempfile::tempdir().expect("tempdir");
    let repo = tempfile::tempdir().expect("tempdir");
    let mux = FakeMux::with_frames(&["working"]);
    let supervisor = test_supervisor(test_config(logs.path()), mux.clone(), repo.path()).await;

    let launched = supervisor
        .launch(&launch_request("exec-1"))
        .await
        .expect("launch should succeed");
    let agent_id = launched.result.agent_id.clone();
    assert_eq!(launched.result.session_name, format!("agent_{agent_id}"));

    let record = supervisor.agent(&agent_id).await.expect("record");
    assert_eq!(record.status, AgentStatus::Launched);
    assert_eq!(record.execution_id, "exec-1");
    assert_eq!(record.role, "implementer");
    assert_eq!(record.pid, Some(4242));

    let events = supervisor.events(&agent_id).await.expect("events");
    assert_eq!(
        kinds(&events)[..2],
        [EventKind::Preparing, EventKind::Launched]
    );
    assert_eq!(events[0].parent_id, None);
    assert_eq!(events[1].parent_id.as_deref(), Some(events[0].id.as_str()));
    assert_eq!(events[1].data["status"], "launched");
    assert_eq!(events[1].data["previousStatus"], "preparing");
    assert_eq!(events[1].data["sessionName"], launched.result.session_name.as_str());
    assert_eq!(events[1].data["pid"], 4242);
}

#[tokio::test]
async fn session_runs_agent_cli_in_codebase_directory() {
    let logs = tempfile::tempdir().expect("tempdir");
    let repo = tempfile::tempdir().expect("tempdir");
    let mux = FakeMux::with_frames(&["working"]);
    let supervisor = test_supervisor(test_config(logs.path()), mux.clone(), repo.path()).await;

    let mut request = launch_request("exec-1");
    request.prompt = "don't stop".into();
    request.model = Some("opus".into());
    let launched = supervisor.launch(&request).await.expect("launch");

    let started = mux.started();
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].name, launched.result.session_name);
    assert_eq!(started[0].working_dir, repo.path());
    assert_eq!(
        started[0].command,
        r"'claude' '--dangerously-skip-permissions' '--model' 'opus' 'don'\''t stop'"
    );
}

#[tokio::test]
async fn slow_session_start_is_verified_by_polling() {
    let logs = tempfile::tempdir().expect("tempdir");
    let repo = tempfile::tempdir().expect("tempdir");
    let mux = FakeMux::with_frames(&["working"]);
    mux.appear_after(5);
    let supervisor = test_supervisor(test_config(logs.path()), mux.clone(), repo.path()).await;

    let launched = supervisor
        .launch(&launch_request("exec-1"))
        .await
        .expect("launch should succeed once the session appears");

    let record = supervisor
        .agent(&launched.result.agent_id)
        .await
        .expect("record");
    assert_eq!(record.status, AgentStatus::Launched);
}

#[tokio::test]
async fn session_that_never_appears_fails_launch() {
    let logs = tempfile::tempdir().expect("tempdir");
    let repo = tempfile::tempdir().expect("tempdir");
    let mux = FakeMux::with_frames(&["working"]);
    mux.never_appear();
    let supervisor = test_supervisor(test_config(logs.path()), mux.clone(), repo.path()).await;

    let err = supervisor
        .launch(&launch_request("exec-1"))
        .await
        .err()
        .expect("launch should fail");
    assert!(matches!(err, AppError::Process(_)), "got {err}");
    assert!(err.to_string().contains("did not appear"));

    let failed = supervisor.list(AgentStatus::Failed).await.expect("list");
    assert_eq!(failed.len(), 1);

    let events = supervisor.events(&failed[0].id).await.expect("events");
    assert_eq!(kinds(&events), [EventKind::Preparing, EventKind::Failed]);
    assert_eq!(count(&events, EventKind::Launched), 0);
    assert!(events[1].data["reason"]
        .as_str()
        .is_some_and(|r| r.contains("did not appear")));

    // A launch that never came up must not touch other sessions.
    assert_eq!(mux.kill_session_calls(), 0);
    assert_eq!(mux.kill_server_calls(), 0);
}

#[tokio::test]
async fn new_session_error_fails_launch() {
    let logs = tempfile::tempdir().expect("tempdir");
    let repo = tempfile::tempdir().expect("tempdir");
    let mux = FakeMux::with_frames(&["working"]);
    mux.fail_new_session();
    let supervisor = test_supervisor(test_config(logs.path()), mux.clone(), repo.path()).await;

    let err = supervisor
        .launch(&launch_request("exec-1"))
        .await
        .err()
        .expect("launch should fail");
    assert!(matches!(err, AppError::Process(_)), "got {err}");

    let failed = supervisor.list(AgentStatus::Failed).await.expect("list");
    assert_eq!(failed.len(), 1);
    assert!(mux.started().is_empty());
}

#[tokio::test]
async fn incomplete_request_is_rejected_without_record() {
    let logs = tempfile::tempdir().expect("tempdir");
    let repo = tempfile::tempdir().expect("tempdir");
    let mux = FakeMux::with_frames(&["working"]);
    let supervisor = test_supervisor(test_config(logs.path()), mux.clone(), repo.path()).await;

    let mut request = launch_request("exec-1");
    request.prompt = "   ".into();
    let err = supervisor
        .launch(&request)
        .await
        .err()
        .expect("validation should fail");
    assert!(matches!(err, AppError::Validation(_)), "got {err}");
    assert!(err.to_string().contains("prompt"));

    let records = supervisor
        .lifecycle()
        .agents()
        .list_by_execution("exec-1")
        .await
        .expect("list");
    assert!(records.is_empty());
    assert!(mux.started().is_empty());
}

#[tokio::test]
async fn unknown_codebase_is_not_found() {
    let logs = tempfile::tempdir().expect("tempdir");
    let repo = tempfile::tempdir().expect("tempdir");
    let mux = FakeMux::with_frames(&["working"]);
    let supervisor = test_supervisor(test_config(logs.path()), mux.clone(), repo.path()).await;

    let mut request = launch_request("exec-1");
    request.codebase_id = "missing".into();
    let err = supervisor
        .launch(&request)
        .await
        .err()
        .expect("lookup should fail");
    assert!(matches!(err, AppError::NotFound(_)), "got {err}");

    let records = supervisor
        .lifecycle()
        .agents()
        .list_by_execution("exec-1")
        .await
        .expect("list");
    assert!(records.is_empty());
}
