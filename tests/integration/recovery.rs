//! Integration tests for coordinator eviction and restart
//!
//! The coordinator context can be torn down at any time; a fresh one must be
//! able to stop what the old one started.

use std::sync::Arc;

use bugreel::coordinator::{Coordinator, CoordinatorDeps};
use bugreel::host::mock::{ManualClock, MockInstrumentation, MockMediaBackend, MockPageHost};
use bugreel::host::LocalCaptureHost;
use bugreel::page::DomEvent;
use bugreel::protocol::{CaptureMode, Response, TabId};
use bugreel::session::{FileStateStore, PersistedSession, StateStore};
use bugreel::{Config, SessionError};
use tempfile::tempdir;

use super::common::{button, settle, World, TAB};

/// A revived coordinator adopts the persisted session and salvages the video
#[tokio::test(start_paused = true)]
async fn test_revived_coordinator_stops_persisted_session() {
    let world = World::worker();
    assert_eq!(world.start(TAB, CaptureMode::Tab).await, Response::Ok);
    world
        .observer(TAB)
        .dom_event(DomEvent::Click(button("go", "Go")))
        .await;
    settle().await;

    world.evict();
    let revived = world.revived();
    assert!(!revived.get_state().is_recording);

    let bundle = revived.request_stop().await.unwrap();
    assert!(bundle.has_video());
    // Buffered logs lived in the evicted context
    assert!(bundle.actions.is_empty());
    assert_eq!(world.store.snapshot(), None);
    assert!(!world.observer(TAB).recorder().is_recording());
}

/// Even without a persisted record, a worker that is still recording is
/// stopped and its data returned
#[tokio::test(start_paused = true)]
async fn test_recording_worker_is_salvaged_without_record() {
    let world = World::worker();
    assert_eq!(world.start(TAB, CaptureMode::Tab).await, Response::Ok);
    world.evict();
    world.store.clear().await.unwrap();

    let revived = world.revived();
    let bundle = revived.request_stop().await.unwrap();
    assert!(bundle.has_video());

    assert_eq!(
        revived.request_stop().await,
        Err(SessionError::NotRecording)
    );
}

fn file_backed(store: FileStateStore) -> Coordinator {
    let backend = MockMediaBackend::new();
    let config = Config::default();
    Coordinator::new(
        config.clone(),
        CoordinatorDeps {
            page: Arc::new(MockPageHost::new().with_observer(TAB)),
            capture: Arc::new(LocalCaptureHost::new(Arc::new(backend), config.capture)),
            instrumentation: Arc::new(MockInstrumentation::new()),
            store: Arc::new(store),
            clock: Arc::new(ManualClock::new(50_000)),
        },
    )
}

/// Session state survives in the file store across coordinator instances
#[tokio::test]
async fn test_file_store_carries_session_across_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state").join("session-state.json");

    let first = file_backed(FileStateStore::new(&path));
    first.request_start(TabId(4), CaptureMode::Tab).await.unwrap();
    assert!(path.exists());

    let second = file_backed(FileStateStore::new(&path));
    second.restore().await;
    let status = second.get_state();
    assert!(status.is_recording);
    assert_eq!(status.start_time, Some(50_000));
    assert_eq!(second.session().tab_id(), Some(TabId(4)));
}

/// A record claiming to record without ever having started is dropped
#[tokio::test]
async fn test_unconfirmed_record_restores_as_idle() {
    let dir = tempdir().unwrap();
    let store = FileStateStore::new(dir.path().join("session-state.json"));
    store
        .save(&PersistedSession {
            is_recording: true,
            is_fullscreen_mode: false,
            tab_id: Some(TabId(2)),
            start_time: None,
            pending_user_confirmation: false,
        })
        .await
        .unwrap();

    let coordinator = file_backed(store.clone());
    coordinator.restore().await;
    assert!(coordinator.session().is_idle());
    assert_eq!(store.load().await.unwrap(), None);
}

/// A pending picker record restores as pending and stop cancels it
#[tokio::test]
async fn test_pending_record_is_cancelled_by_stop() {
    let dir = tempdir().unwrap();
    let store = FileStateStore::new(dir.path().join("session-state.json"));
    store
        .save(&PersistedSession {
            is_recording: true,
            is_fullscreen_mode: true,
            tab_id: Some(TabId(2)),
            start_time: None,
            pending_user_confirmation: true,
        })
        .await
        .unwrap();

    let coordinator = file_backed(store.clone());
    assert_eq!(
        coordinator.request_stop().await,
        Err(SessionError::NotRecording)
    );
    assert_eq!(store.load().await.unwrap(), None);
}
