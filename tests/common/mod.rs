//! Shared test utilities for bugreel
//!
//! Builds an in-process world: a served coordinator, a page host whose
//! injector spawns real tab observers, and a capture host over the mock media
//! backend.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bugreel::capture::MediaCaptureWorker;
use bugreel::config::{CaptureTopology, Config};
use bugreel::coordinator::{Coordinator, CoordinatorDeps};
use bugreel::host::mock::{
    CollectingConsumer, ManualClock, MockInstrumentation, MockMediaBackend, StaticPage,
};
use bugreel::host::{HostError, LocalCaptureHost, LocalPageHost};
use bugreel::page::{ActionRecorder, ElementSnapshot, PageCapture, TabObserver};
use bugreel::protocol::{
    mailbox, CaptureMode, ContextLink, Envelope, Request, Response, Sender, TabId,
};
use bugreel::session::MemoryStateStore;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

pub const TAB: TabId = TabId(1);

type Observers = Arc<Mutex<HashMap<TabId, (TabObserver, StaticPage)>>>;

pub struct World {
    pub config: Config,
    pub coordinator: Coordinator,
    pub control: ContextLink,
    pub page_host: Arc<LocalPageHost>,
    pub capture: Arc<LocalCaptureHost>,
    pub backend: MockMediaBackend,
    pub instrumentation: MockInstrumentation,
    pub store: MemoryStateStore,
    pub clock: ManualClock,
    pub consumer: Arc<CollectingConsumer>,
    observers: Observers,
    serving: JoinHandle<()>,
}

impl World {
    pub fn worker() -> Self {
        Self::new(Config::default())
    }

    pub fn in_page() -> Self {
        Self::new(Config {
            topology: CaptureTopology::InPage,
            ..Config::default()
        })
    }

    pub fn new(config: Config) -> Self {
        let backend = MockMediaBackend::new();
        let capture = Arc::new(LocalCaptureHost::new(
            Arc::new(backend.clone()),
            config.capture.clone(),
        ));
        let instrumentation = MockInstrumentation::new();
        let store = MemoryStateStore::new();
        let clock = ManualClock::new(1_000);
        let consumer = Arc::new(CollectingConsumer::new());
        let observers: Observers = Arc::new(Mutex::new(HashMap::new()));

        let (coordinator_mailbox, inbox) = mailbox::<Envelope, Response>(64);

        let injector = {
            let config = config.clone();
            let backend = backend.clone();
            let clock = clock.clone();
            let consumer = Arc::clone(&consumer);
            let observers = Arc::clone(&observers);
            let coordinator_mailbox = coordinator_mailbox.clone();
            move |tab: TabId| {
                let page = StaticPage::new(format!("https://app.test/tab-{tab}"));
                let link = ContextLink::new(coordinator_mailbox.clone(), Sender::tab(tab));
                let recorder = ActionRecorder::new(
                    config.recorder.clone(),
                    Arc::new(page.clone()),
                    Arc::new(link.clone()),
                    Arc::new(clock.clone()),
                );
                let page_capture = match config.topology {
                    CaptureTopology::InPage => Some(PageCapture::new(
                        MediaCaptureWorker::new(Arc::new(backend.clone()), config.capture.clone()),
                        consumer.clone(),
                    )),
                    CaptureTopology::Worker => None,
                };
                let observer = TabObserver::new(tab, recorder, link, page_capture);
                let (mailbox, _handle) = observer.spawn();
                observers.lock().insert(tab, (observer, page));
                Ok::<_, HostError>(mailbox)
            }
        };
        let page_host = Arc::new(LocalPageHost::with_injector(injector));

        let coordinator = Coordinator::new(
            config.clone(),
            CoordinatorDeps {
                page: page_host.clone(),
                capture: capture.clone(),
                instrumentation: Arc::new(instrumentation.clone()),
                store: Arc::new(store.clone()),
                clock: Arc::new(clock.clone()),
            },
        );
        let serving = coordinator.clone().serve(inbox);
        let control = ContextLink::new(coordinator_mailbox, Sender::control());

        Self {
            config,
            coordinator,
            control,
            page_host,
            capture,
            backend,
            instrumentation,
            store,
            clock,
            consumer,
            observers,
            serving,
        }
    }

    /// A second coordinator over the same collaborators, as after the first
    /// one was evicted
    pub fn revived(&self) -> Coordinator {
        Coordinator::new(
            self.config.clone(),
            CoordinatorDeps {
                page: self.page_host.clone(),
                capture: self.capture.clone(),
                instrumentation: Arc::new(self.instrumentation.clone()),
                store: Arc::new(self.store.clone()),
                clock: Arc::new(self.clock.clone()),
            },
        )
    }

    /// Stop serving, as if the coordinator context were evicted
    pub fn evict(&self) {
        self.serving.abort();
    }

    pub fn observer(&self, tab: TabId) -> TabObserver {
        self.observers
            .lock()
            .get(&tab)
            .map(|(observer, _)| observer.clone())
            .expect("no observer injected for tab")
    }

    pub fn page(&self, tab: TabId) -> StaticPage {
        self.observers
            .lock()
            .get(&tab)
            .map(|(_, page)| page.clone())
            .expect("no observer injected for tab")
    }

    pub async fn send(&self, request: Request) -> Response {
        self.control.send(request).await.expect("coordinator is gone")
    }

    pub async fn start(&self, tab: TabId, mode: CaptureMode) -> Response {
        self.send(Request::StartSession { tab_id: tab, mode }).await
    }

    pub async fn stop(&self) -> Response {
        self.send(Request::StopSession).await
    }
}

/// Let spawned tasks run. Sleeping advances paused time as well.
pub async fn settle() {
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(1)).await;
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
}

pub fn button(id: &str, label: &str) -> ElementSnapshot {
    ElementSnapshot::new("BUTTON")
        .with_attr("id", id)
        .with_text(label)
}

pub fn password_field() -> ElementSnapshot {
    ElementSnapshot::new("INPUT")
        .with_attr("type", "password")
        .with_attr("name", "password")
}
