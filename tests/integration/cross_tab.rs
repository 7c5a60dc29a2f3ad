//! Integration tests for the in-page capture topology and multi-tab routing
//!
//! In this topology the observed tab holds the stream itself; the coordinator
//! only brokers the prompt and the logs.

use std::time::Duration;

use bugreel::host::PageHost;
use bugreel::page::{ActionKind, DomEvent};
use bugreel::protocol::{CaptureMode, ErrorCode, Request, Response, TabId};

use super::common::{button, settle, World, TAB};

/// The tab answers the prompt, records, and emits the bundle on stop
#[tokio::test(start_paused = true)]
async fn test_in_page_capture_emits_bundle_from_tab() {
    let world = World::in_page();
    assert_eq!(world.start(TAB, CaptureMode::Tab).await, Response::Ok);

    let observer = world.observer(TAB);
    assert!(observer.recorder().is_recording());
    observer
        .dom_event(DomEvent::Click(button("buy", "Buy now")))
        .await;
    settle().await;

    match world.stop().await {
        Response::Stopped { bundle } => assert!(bundle.video.is_none()),
        other => panic!("Expected stopped response, got {:?}", other),
    }

    let bundle = tokio::time::timeout(Duration::from_secs(5), world.consumer.next_bundle())
        .await
        .expect("tab never emitted its bundle")
        .expect("consumer closed");
    assert!(bundle.has_video());
    assert_eq!(bundle.actions.len(), 1);
    assert_eq!(bundle.actions[0].kind, ActionKind::Click);

    // The acknowledgement releases the retained logs
    settle().await;
    assert!(world.coordinator.session_logs().actions.is_empty());
}

/// Cancelling the picker fails the start and leaves the session idle
#[tokio::test(start_paused = true)]
async fn test_cancelled_prompt_fails_start() {
    let world = World::in_page();
    let gate = world.backend.gate_picker();

    let starting = {
        let control = world.control.clone();
        tokio::spawn(async move {
            control
                .send(Request::StartSession {
                    tab_id: TAB,
                    mode: CaptureMode::Fullscreen,
                })
                .await
        })
    };
    for _ in 0..200 {
        if world
            .store
            .snapshot()
            .is_some_and(|record| record.pending_user_confirmation)
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    gate.cancel();

    match starting.await.unwrap().unwrap() {
        Response::Error { code, .. } => assert_eq!(code, ErrorCode::CaptureProvisioningFailed),
        other => panic!("Expected error response, got {:?}", other),
    }
    assert!(world.coordinator.session().is_idle());
    assert_eq!(world.store.snapshot(), None);
}

/// Only the recording tab contributes actions
#[tokio::test(start_paused = true)]
async fn test_actions_from_other_tabs_are_ignored() {
    let world = World::worker();
    let other = TabId(2);
    world.page_host.inject_observer(other).await.unwrap();
    assert_eq!(world.start(TAB, CaptureMode::Tab).await, Response::Ok);

    // A recorder that believes it is recording in the wrong tab
    let stray = world.observer(other);
    assert!(stray.recorder().start());
    stray
        .dom_event(DomEvent::Click(button("elsewhere", "Elsewhere")))
        .await;
    world
        .observer(TAB)
        .dom_event(DomEvent::Click(button("here", "Here")))
        .await;
    settle().await;

    match world.stop().await {
        Response::Stopped { bundle } => {
            assert_eq!(bundle.actions.len(), 1);
            assert_eq!(
                bundle.actions[0]
                    .element
                    .as_ref()
                    .map(|element| element.human_readable_name.as_str()),
                Some("Here")
            );
        }
        other => panic!("Expected stopped response, got {:?}", other),
    }
}

/// An observer injected mid-session resumes recording on its own
#[tokio::test(start_paused = true)]
async fn test_reinjected_observer_resumes_recording() {
    let world = World::worker();
    assert_eq!(world.start(TAB, CaptureMode::Tab).await, Response::Ok);

    // The page reloads and loses its observer
    assert!(world.page_host.remove(TAB));
    world.page_host.inject_observer(TAB).await.unwrap();
    settle().await;

    let observer = world.observer(TAB);
    assert!(observer.recorder().is_recording());
    observer
        .dom_event(DomEvent::Click(button("again", "Again")))
        .await;
    settle().await;

    match world.stop().await {
        Response::Stopped { bundle } => assert_eq!(bundle.actions.len(), 1),
        other => panic!("Expected stopped response, got {:?}", other),
    }
}
