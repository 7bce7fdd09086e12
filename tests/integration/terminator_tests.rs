//! Integration tests for session termination outcomes.

use std::sync::Arc;

use agent_warden::multiplexer::{Multiplexer, SessionSpec};
use agent_warden::orchestrator::terminator::{KillMethod, Terminator};

use super::test_helpers::FakeMux;

async fn mux_with_session(name: &str) -> Arc<FakeMux> {
    let mux = FakeMux::with_frames(&["working"]);
    mux.new_session(&SessionSpec {
        name: name.into(),
        working_dir: std::env::temp_dir(),
        command: "'claude' 'hi'".into(),
    })
    .await
    .expect("new session");
    mux
}

#[tokio::test]
async fn live_session_is_killed_by_name() {
    let mux = mux_with_session("agent_a").await;
    let terminator = Terminator::new(mux.clone(), true);

    assert_eq!(terminator.terminate("agent_a").await, KillMethod::Session);
    assert!(!mux.is_alive("agent_a"));
    assert_eq!(mux.kill_server_calls(), 0);
}

#[tokio::test]
async fn missing_session_falls_back_to_server() {
    let mux = mux_with_session("agent_a").await;
    let terminator = Terminator::new(mux.clone(), true);

    assert_eq!(terminator.terminate("agent_gone").await, KillMethod::Server);
    assert!(!mux.is_alive("agent_a"));
}

#[tokio::test]
async fn nothing_to_kill_reports_none() {
    let mux = FakeMux::with_frames(&[]);
    let terminator = Terminator::new(mux.clone(), true);

    assert_eq!(terminator.terminate("agent_gone").await, KillMethod::None);
    assert_eq!(mux.kill_session_calls(), 1);
    assert_eq!(mux.kill_server_calls(), 1);
}

#[tokio::test]
async fn disabled_fallback_never_kills_server() {
    let mux = mux_with_session("agent_a").await;
    let terminator = Terminator::new(mux.clone(), false);

    assert_eq!(terminator.terminate("agent_gone").await, KillMethod::None);
    assert!(mux.is_alive("agent_a"));
    assert_eq!(mux.kill_server_calls(), 0);
}

#[test]
fn kill_method_names_are_stable() {
    assert_eq!(KillMethod::Session.to_string(), "session");
    assert_eq!(KillMethod::Server.to_string(), "server");
    assert_eq!(
        serde_json::to_value(KillMethod::None).expect("serialize"),
        "none"
    );
}
