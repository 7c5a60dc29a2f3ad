//! Integration tests for the bugreel binary

use std::fs;

use assert_cmd::Command;
use bugreel::protocol::TabId;
use bugreel::session::{FileStateStore, PersistedSession, StateStore};
use predicates::prelude::*;
use tempfile::tempdir;

fn bugreel(data_dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("bugreel").unwrap();
    cmd.arg("--data-dir").arg(data_dir);
    cmd
}

/// With nothing persisted the state command reports an idle record
#[test]
fn test_state_reports_idle_by_default() {
    let dir = tempdir().unwrap();
    bugreel(dir.path())
        .arg("state")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"isRecording\": false"));
    assert!(dir.path().join("logs").join("bugreel.log").exists());
}

/// reset-state removes a stale record left by an evicted coordinator
#[test]
fn test_reset_state_clears_persisted_record() {
    let dir = tempdir().unwrap();
    let state = dir.path().join("session-state.json");
    tokio_test::block_on(FileStateStore::new(&state).save(&PersistedSession {
        is_recording: true,
        is_fullscreen_mode: false,
        tab_id: Some(TabId(3)),
        start_time: Some(1_700_000_000_000),
        pending_user_confirmation: false,
    }))
    .unwrap();

    bugreel(dir.path())
        .arg("state")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"isRecording\": true"))
        .stdout(predicate::str::contains("\"tabId\": 3"));

    bugreel(dir.path()).arg("reset-state").assert().success();
    assert!(!state.exists());
}

/// correlate folds an event stream into logs, dropping our own diagnostics
#[test]
fn test_correlate_event_stream() {
    let dir = tempdir().unwrap();
    let events = dir.path().join("events.jsonl");
    fs::write(
        &events,
        [
            r#"{"method":"Network.requestWillBeSent","params":{"requestId":"7.1","type":"Fetch","request":{"url":"https://api.test/cart","method":"POST","postData":"{\"sku\":1}"}}}"#,
            r#"{"method":"Network.responseReceived","params":{"requestId":"7.1","response":{"status":500,"statusText":"Internal Server Error","mimeType":"application/json"}}}"#,
            r#"{"method":"Network.loadingFinished","params":{"requestId":"7.1","encodedDataLength":30}}"#,
            r#"{"method":"Console.messageAdded","params":{"message":{"level":"error","text":"cart update failed"}}}"#,
            r#"{"method":"Console.messageAdded","params":{"message":{"level":"log","text":"[BUGREEL] recorder attached"}}}"#,
            "not an event",
        ]
        .join("\n"),
    )
    .unwrap();
    let bodies = dir.path().join("bodies.json");
    fs::write(&bodies, r#"{"7.1": "{\"error\":\"out of stock\"}"}"#).unwrap();

    bugreel(dir.path())
        .arg("correlate")
        .arg(&events)
        .arg("--bodies")
        .arg(&bodies)
        .assert()
        .success()
        .stdout(predicate::str::contains("https://api.test/cart"))
        .stdout(predicate::str::contains("cart update failed"))
        .stdout(predicate::str::contains("out of stock"))
        .stdout(predicate::str::contains("recorder attached").not());
}

#[test]
fn test_correlate_missing_file_fails() {
    let dir = tempdir().unwrap();
    bugreel(dir.path())
        .arg("correlate")
        .arg(dir.path().join("missing.jsonl"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read"));
}
