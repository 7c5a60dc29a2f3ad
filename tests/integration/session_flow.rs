//! Integration tests for the worker-topology session flow
//!
//! Tests the flow: start -> observer injected -> DOM events -> stop -> bundle

use std::time::Duration;

use bugreel::capture::CaptureError;
use bugreel::instrumentation::InstrumentationEvent;
use bugreel::page::{ActionKind, DomEvent};
use bugreel::protocol::{CaptureMode, ErrorCode, Request, Response};
use tokio::sync::mpsc;

use super::common::{button, password_field, settle, World, TAB};

fn expect_bundle(response: Response) -> bugreel::SessionBundle {
    match response {
        Response::Stopped { bundle } => bundle,
        other => panic!("Expected stopped response, got {:?}", other),
    }
}

/// Three clicks end up as three actions next to a non-empty video
#[tokio::test(start_paused = true)]
async fn test_clicks_are_bundled_with_video() {
    let world = World::worker();
    assert_eq!(world.start(TAB, CaptureMode::Tab).await, Response::Ok);
    assert!(world.page_host.has_observer(TAB));

    let observer = world.observer(TAB);
    assert!(observer.recorder().is_recording());
    for (i, label) in ["Add", "Save", "Close"].iter().enumerate() {
        world.clock.advance(100);
        observer
            .dom_event(DomEvent::Click(button(&format!("btn-{i}"), label)))
            .await;
    }
    settle().await;

    let bundle = expect_bundle(world.stop().await);
    assert!(bundle.has_video());
    assert_eq!(bundle.actions.len(), 3);
    assert!(bundle
        .actions
        .iter()
        .all(|action| action.kind == ActionKind::Click));
    let names: Vec<_> = bundle
        .actions
        .iter()
        .filter_map(|action| action.element.as_ref())
        .map(|element| element.human_readable_name.as_str())
        .collect();
    assert_eq!(names, ["Add", "Save", "Close"]);

    // Timestamps are monotonic
    assert!(bundle
        .actions
        .windows(2)
        .all(|pair| pair[0].timestamp <= pair[1].timestamp));
    assert!(!observer.recorder().is_recording());
}

/// Password fields never leak what was typed
#[tokio::test(start_paused = true)]
async fn test_password_values_are_redacted() {
    let world = World::worker();
    assert_eq!(world.start(TAB, CaptureMode::Tab).await, Response::Ok);
    let observer = world.observer(TAB);

    let secret = "hunter22";
    for i in 1..=secret.len() {
        observer
            .dom_event(DomEvent::Input(password_field().with_value(&secret[..i])))
            .await;
    }
    tokio::time::sleep(world.config.recorder.typing_debounce + Duration::from_millis(50)).await;
    observer
        .dom_event(DomEvent::Change(password_field().with_value(secret)))
        .await;
    settle().await;

    let bundle = expect_bundle(world.stop().await);
    let kinds: Vec<_> = bundle.actions.iter().map(|action| action.kind).collect();
    assert_eq!(kinds, [ActionKind::Typing, ActionKind::Input]);
    for action in &bundle.actions {
        assert_eq!(action.value.as_deref(), Some("***"));
    }
    let serialized = serde_json::to_string(&bundle).unwrap();
    assert!(!serialized.contains(secret));
}

/// A navigation after a click is recorded once the page settles
#[tokio::test(start_paused = true)]
async fn test_click_through_navigation_is_recorded() {
    let world = World::worker();
    assert_eq!(world.start(TAB, CaptureMode::Tab).await, Response::Ok);
    let observer = world.observer(TAB);

    observer
        .dom_event(DomEvent::Click(button("next", "Next")))
        .await;
    world.page(TAB).set_url("https://app.test/step-2");
    tokio::time::sleep(world.config.recorder.navigation_settle + Duration::from_millis(10)).await;
    settle().await;

    let bundle = expect_bundle(world.stop().await);
    let kinds: Vec<_> = bundle.actions.iter().map(|action| action.kind).collect();
    assert_eq!(kinds, [ActionKind::Click, ActionKind::Navigation]);
    assert_eq!(bundle.actions[1].page_url, "https://app.test/step-2");
}

/// A provisioning failure leaves nothing behind
#[tokio::test(start_paused = true)]
async fn test_failed_start_rolls_back() {
    let world = World::worker();
    world
        .backend
        .fail_next_open(CaptureError::StreamUnavailable("tab is not capturable".into()));

    match world.start(TAB, CaptureMode::Tab).await {
        Response::Error { code, .. } => assert_eq!(code, ErrorCode::CaptureProvisioningFailed),
        other => panic!("Expected error response, got {:?}", other),
    }
    match world.send(Request::GetState).await {
        Response::State(status) => {
            assert!(!status.is_recording);
            assert_eq!(status.start_time, None);
        }
        other => panic!("Expected state response, got {:?}", other),
    }
    assert_eq!(world.store.snapshot(), None);

    assert_eq!(world.start(TAB, CaptureMode::Tab).await, Response::Ok);
}

/// Stopping twice reports that nothing is recording the second time
#[tokio::test(start_paused = true)]
async fn test_second_stop_is_not_recording() {
    let world = World::worker();
    assert_eq!(world.start(TAB, CaptureMode::Tab).await, Response::Ok);
    expect_bundle(world.stop().await);

    match world.stop().await {
        Response::Error { code, .. } => assert_eq!(code, ErrorCode::NotRecording),
        other => panic!("Expected error response, got {:?}", other),
    }
}

/// Instrumentation events for the recording tab land in the bundle
#[tokio::test(start_paused = true)]
async fn test_instrumentation_stream_is_correlated() {
    let world = World::worker();
    world
        .instrumentation
        .with_body("42.1", r#"{"items":[1,2,3]}"#);
    assert_eq!(world.start(TAB, CaptureMode::Tab).await, Response::Ok);

    let (tx, rx) = mpsc::channel(16);
    let _pump = world.coordinator.pump_instrumentation(TAB, rx);

    let raw = [
        r#"{"method":"Runtime.consoleAPICalled","params":{"type":"error","args":[{"type":"string","value":"Request failed"}],"timestamp":1200}}"#,
        r#"{"method":"Runtime.consoleAPICalled","params":{"type":"log","args":[{"type":"string","value":"[BUGREEL] observer ready"}],"timestamp":1201}}"#,
        r#"{"method":"Network.requestWillBeSent","params":{"requestId":"42.1","type":"XHR","timestamp":1.25,"request":{"url":"https://api.test/items","method":"GET"}}}"#,
        r#"{"method":"Network.requestWillBeSent","params":{"requestId":"42.2","type":"Image","timestamp":1.5,"request":{"url":"https://cdn.test/logo.png","method":"GET"}}}"#,
        r#"{"method":"Network.responseReceived","params":{"requestId":"42.1","response":{"status":200,"statusText":"OK","mimeType":"application/json"}}}"#,
        r#"{"method":"Network.responseReceived","params":{"requestId":"42.2","response":{"status":200,"mimeType":"image/png"}}}"#,
        r#"{"method":"Network.loadingFinished","params":{"requestId":"42.2","encodedDataLength":2048}}"#,
        r#"{"method":"Network.loadingFinished","params":{"requestId":"42.1","encodedDataLength":17}}"#,
    ];
    for line in raw {
        let event: InstrumentationEvent = serde_json::from_str(line).unwrap();
        tx.send(event).await.unwrap();
    }
    settle().await;
    settle().await;

    let bundle = expect_bundle(world.stop().await);
    assert_eq!(bundle.console_logs.len(), 1);
    assert_eq!(bundle.console_logs[0].text, "Request failed");

    let urls: Vec<_> = bundle
        .network_logs
        .iter()
        .map(|exchange| exchange.url.as_str())
        .collect();
    assert_eq!(urls, ["https://api.test/items", "https://cdn.test/logo.png"]);
    assert_eq!(
        bundle.network_logs[0].body.as_deref(),
        Some(r#"{"items":[1,2,3]}"#)
    );
    // Static resources only get a placeholder
    assert!(bundle.network_logs[1]
        .body
        .as_deref()
        .is_some_and(|body| body.starts_with("[Response body not captured")));
    assert!(!world
        .instrumentation
        .calls()
        .contains(&"body:1:42.2".to_string()));
}

/// Screenshots target the recording tab when no tab is named
#[tokio::test(start_paused = true)]
async fn test_frame_capture_targets_recording_tab() {
    let world = World::worker();
    match world
        .send(Request::CaptureVisibleFrame { tab_id: None })
        .await
    {
        Response::Error { code, .. } => assert_eq!(code, ErrorCode::NoTargetTab),
        other => panic!("Expected error response, got {:?}", other),
    }

    assert_eq!(world.start(TAB, CaptureMode::Tab).await, Response::Ok);
    // The in-process page host cannot take screenshots
    match world
        .send(Request::CaptureVisibleFrame { tab_id: None })
        .await
    {
        Response::Error { code, .. } => assert_eq!(code, ErrorCode::HostFailure),
        other => panic!("Expected error response, got {:?}", other),
    }
}
