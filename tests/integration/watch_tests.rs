//! Integration tests for the watch loop and launch-and-wait.

use std::fs;
use std::time::Duration;

use agent_warden::models::agent::AgentStatus;
use agent_warden::models::event::EventKind;
use agent_warden::AppError;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::test_helpers::{count, launch_request, test_config, test_supervisor, FakeMux};

#[tokio::test]
async fn idle_session_completes_exactly_once() {
    let logs = tempfile::tempdir().expect("tempdir");
    let repo = tempfile::tempdir().expect("tempdir");
    let mux = FakeMux::with_frames(&["thinking..."]);
    let supervisor = test_supervisor(test_config(logs.path()), mux.clone(), repo.path()).await;

    let launched = supervisor
        .launch(&launch_request("exec-1"))
        .await
        .expect("launch");
    let agent_id = launched.result.agent_id.clone();
    let session_name = launched.result.session_name.clone();

    let record = supervisor
        .watch(&agent_id, &CancellationToken::new())
        .await
        .expect("watch");
    assert_eq!(record.status, AgentStatus::Completed);
    launched.discovery.await.expect("discovery task");

    let events = supervisor.events(&agent_id).await.expect("events");
    assert_eq!(count(&events, EventKind::Running), 1);
    assert_eq!(count(&events, EventKind::Completed), 1);
    assert_eq!(count(&events, EventKind::Failed), 0);

    let terminated: Vec<_> = events
        .iter()
        .filter(|e| e.kind == EventKind::SessionTerminated)
        .collect();
    assert_eq!(terminated.len(), 1);
    assert_eq!(terminated[0].data["killMethod"], "session");

    assert_eq!(mux.kill_session_calls(), 1);
    assert_eq!(mux.kill_server_calls(), 0);
    assert!(!mux.is_alive(&session_name));

    // Watching a finished agent is a no-op.
    let again = supervisor
        .watch(&agent_id, &CancellationToken::new())
        .await
        .expect("watch again");
    assert_eq!(again.status, AgentStatus::Completed);
    let after = supervisor.events(&agent_id).await.expect("events");
    assert_eq!(after.len(), events.len());
    assert_eq!(mux.kill_session_calls(), 1);
}

#[tokio::test]
async fn changing_output_keeps_agent_running_until_idle() {
    let logs = tempfile::tempdir().expect("tempdir");
    let repo = tempfile::tempdir().expect("tempdir");
    let mux = FakeMux::with_frames(&["step 1", "step 2", "step 3", "done"]);
    let supervisor = test_supervisor(test_config(logs.path()), mux.clone(), repo.path()).await;

    let launched = supervisor
        .launch(&launch_request("exec-1"))
        .await
        .expect("launch");
    let agent_id = launched.result.agent_id.clone();

    let record = supervisor
        .watch(&agent_id, &CancellationToken::new())
        .await
        .expect("watch");
    assert_eq!(record.status, AgentStatus::Completed);

    // Repeated `Running` observations emit a single event.
    let events = supervisor.events(&agent_id).await.expect("events");
    assert_eq!(count(&events, EventKind::Running), 1);
    assert_eq!(count(&events, EventKind::Completed), 1);
}

#[tokio::test]
async fn vanished_session_fails_agent() {
    let logs = tempfile::tempdir().expect("tempdir");
    let repo = tempfile::tempdir().expect("tempdir");
    let mux = FakeMux::with_frames(&["working"]);
    let supervisor = test_supervisor(test_config(logs.path()), mux.clone(), repo.path()).await;

    let launched = supervisor
        .launch(&launch_request("exec-1"))
        .await
        .expect("launch");
    let agent_id = launched.result.agent_id.clone();
    mux.end_session(&launched.result.session_name);

    let record = supervisor
        .watch(&agent_id, &CancellationToken::new())
        .await
        .expect("watch");
    assert_eq!(record.status, AgentStatus::Failed);

    let events = supervisor.events(&agent_id).await.expect("events");
    assert_eq!(count(&events, EventKind::Failed), 1);
    assert_eq!(count(&events, EventKind::Completed), 0);

    // Nothing left to kill: the session is gone and so is the server.
    let terminated = supervisor
        .lifecycle()
        .events()
        .list_for_agent_by_kind(&agent_id, EventKind::SessionTerminated)
        .await
        .expect("events");
    assert_eq!(terminated.len(), 1);
    assert_eq!(terminated[0].data["killMethod"], "none");
}

#[tokio::test]
async fn cancelled_watch_returns_current_record() {
    let logs = tempfile::tempdir().expect("tempdir");
    let repo = tempfile::tempdir().expect("tempdir");
    let mux = FakeMux::with_frames(&["working"]);
    let mut config = test_config(logs.path());
    config.monitor.idle_samples = u32::MAX;
    let supervisor = test_supervisor(config, mux.clone(), repo.path()).await;

    let launched = supervisor
        .launch(&launch_request("exec-1"))
        .await
        .expect("launch");
    let agent_id = launched.result.agent_id.clone();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(60)).await;
        trigger.cancel();
    });

    let record = tokio::time::timeout(Duration::from_secs(5), supervisor.watch(&agent_id, &cancel))
        .await
        .expect("watch should stop on cancellation")
        .expect("watch");
    assert_eq!(record.status, AgentStatus::Running);
    assert!(mux.is_alive(&launched.result.session_name));
    assert_eq!(mux.kill_session_calls(), 0);
}

#[tokio::test]
async fn completion_captures_transcript_context() {
    let logs = tempfile::tempdir().expect("tempdir");
    let repo = tempfile::tempdir().expect("tempdir");
    let mux = FakeMux::with_frames(&["working"]);

    let transcript = logs
        .path()
        .join("project")
        .join("0b5e1c9a-1111-4222-8333-944455556666.jsonl");
    let created = transcript.clone();
    mux.on_start(move |_| {
        fs::create_dir_all(created.parent().expect("parent")).expect("dirs");
        fs::write(
            &created,
            "{\"type\":\"user\",\"n\":1}\nnot json\n\n{\"type\":\"assistant\",\"n\":2}\n",
        )
        .expect("write transcript");
    });

    let supervisor = test_supervisor(test_config(logs.path()), mux.clone(), repo.path()).await;
    let launched = supervisor
        .launch(&launch_request("exec-1"))
        .await
        .expect("launch");
    let agent_id = launched.result.agent_id.clone();
    launched.discovery.await.expect("discovery task");

    let record = supervisor
        .watch(&agent_id, &CancellationToken::new())
        .await
        .expect("watch");
    assert_eq!(record.status, AgentStatus::Completed);
    assert_eq!(
        record.context,
        Some(json!({
            "entries": 2,
            "parseErrors": 1,
            "lastEntries": [
                { "type": "user", "n": 1 },
                { "type": "assistant", "n": 2 },
            ],
        }))
    );
}

#[tokio::test]
async fn transcript_attached_after_completion_is_summarised() {
    let logs = tempfile::tempdir().expect("tempdir");
    let repo = tempfile::tempdir().expect("tempdir");
    let mux = FakeMux::with_frames(&["working"]);
    let supervisor = test_supervisor(test_config(logs.path()), mux.clone(), repo.path()).await;

    let launched = supervisor
        .launch(&launch_request("exec-1"))
        .await
        .expect("launch");
    let agent_id = launched.result.agent_id.clone();

    let record = supervisor
        .watch(&agent_id, &CancellationToken::new())
        .await
        .expect("watch");
    assert_eq!(record.status, AgentStatus::Completed);
    assert_eq!(record.context, None);
    launched.discovery.await.expect("discovery task");

    // Outside the log root so background discovery never sees it.
    let late = tempfile::tempdir().expect("tempdir");
    let transcript = late.path().join("late.jsonl");
    fs::write(&transcript, "{\"type\":\"result\"}\n").expect("write transcript");

    supervisor
        .lifecycle()
        .attach_log(&agent_id, &transcript.to_string_lossy(), None)
        .await
        .expect("attach");

    let record = supervisor.agent(&agent_id).await.expect("record");
    assert_eq!(record.status, AgentStatus::Completed);
    assert_eq!(
        record.context,
        Some(json!({
            "entries": 1,
            "parseErrors": 0,
            "lastEntries": [{ "type": "result" }],
        }))
    );
}

#[tokio::test]
async fn launch_and_wait_returns_terminal_record() {
    let logs = tempfile::tempdir().expect("tempdir");
    let repo = tempfile::tempdir().expect("tempdir");
    let mux = FakeMux::with_frames(&["a", "b"]);
    let supervisor = test_supervisor(test_config(logs.path()), mux.clone(), repo.path()).await;

    let record = supervisor
        .launch_and_wait(&launch_request("exec-1"), &CancellationToken::new())
        .await
        .expect("launch and wait");
    assert_eq!(record.status, AgentStatus::Completed);
    assert_eq!(record.execution_id, "exec-1");
}

#[tokio::test]
async fn watching_unknown_agent_is_not_found() {
    let logs = tempfile::tempdir().expect("tempdir");
    let repo = tempfile::tempdir().expect("tempdir");
    let mux = FakeMux::with_frames(&["working"]);
    let supervisor = test_supervisor(test_config(logs.path()), mux, repo.path()).await;

    let err = supervisor
        .watch("no-such-agent", &CancellationToken::new())
        .await
        .expect_err("unknown agent");
    assert!(matches!(err, AppError::NotFound(_)), "got {err}");
}
