use agent_warden::orchestrator::transcript::{load_context, summarize, TAIL_ENTRIES};
use agent_warden::AppError;
use serde_json::json;

#[test]
fn counts_entries_and_parse_errors() {
    let text = "{\"a\":1}\n\n  \n{broken\n{\"b\":2}\n";
    let summary = summarize(text);

    assert_eq!(
        summary,
        json!({
            "entries": 2,
            "parseErrors": 1,
            "lastEntries": [{ "a": 1 }, { "b": 2 }],
        })
    );
}

#[test]
fn keeps_only_trailing_entries() {
    let text: String = (0..50).map(|n| format!("{{\"n\":{n}}}\n")).collect();
    let summary = summarize(&text);

    assert_eq!(summary["entries"], 50);
    let tail = summary["lastEntries"].as_array().expect("array");
    assert_eq!(tail.len(), TAIL_ENTRIES);
    assert_eq!(tail[0]["n"], 30);
    assert_eq!(tail[TAIL_ENTRIES - 1]["n"], 49);
}

#[test]
fn empty_transcript_summarises_to_zero() {
    let summary = summarize("");
    assert_eq!(summary["entries"], 0);
    assert_eq!(summary["parseErrors"], 0);
    assert_eq!(summary["lastEntries"], json!([]));
}

#[tokio::test]
async fn loads_transcript_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("session.jsonl");
    std::fs::write(&path, "{\"type\":\"result\"}\n").expect("write");

    let summary = load_context(&path).await.expect("load");
    assert_eq!(summary["entries"], 1);

    let err = load_context(&dir.path().join("absent.jsonl"))
        .await
        .expect_err("missing file");
    assert!(matches!(err, AppError::Io(_)));
}
