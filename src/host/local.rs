//! In-process host: observers and the capture worker run as tasks reached
//! through mailboxes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::{CaptureHost, HostError, PageHost, WorkerPurpose};
use crate::capture::{MediaBackend, MediaCaptureWorker};
use crate::config::CaptureConfig;
use crate::protocol::{Mailbox, Response, TabCommand, TabId, WorkerCommand, WorkerReply};

/// Creates an observer context for a tab on injection
pub trait ObserverInjector: Send + Sync {
    fn inject(&self, tab: TabId) -> Result<Mailbox<TabCommand, Response>, HostError>;
}

impl<F> ObserverInjector for F
where
    F: Fn(TabId) -> Result<Mailbox<TabCommand, Response>, HostError> + Send + Sync,
{
    fn inject(&self, tab: TabId) -> Result<Mailbox<TabCommand, Response>, HostError> {
        self(tab)
    }
}

#[derive(Default)]
pub struct LocalPageHost {
    observers: Mutex<HashMap<TabId, Mailbox<TabCommand, Response>>>,
    injector: Option<Arc<dyn ObserverInjector>>,
}

impl LocalPageHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_injector(injector: impl ObserverInjector + 'static) -> Self {
        Self {
            observers: Mutex::new(HashMap::new()),
            injector: Some(Arc::new(injector)),
        }
    }

    pub fn register(&self, tab: TabId, mailbox: Mailbox<TabCommand, Response>) {
        self.observers.lock().insert(tab, mailbox);
    }

    /// Forget a tab's observer, as when the page navigates away
    pub fn remove(&self, tab: TabId) -> bool {
        self.observers.lock().remove(&tab).is_some()
    }

    pub fn has_observer(&self, tab: TabId) -> bool {
        self.observers
            .lock()
            .get(&tab)
            .is_some_and(|mailbox| !mailbox.is_closed())
    }
}

#[async_trait]
impl PageHost for LocalPageHost {
    async fn send(&self, tab: TabId, command: TabCommand) -> Result<(), HostError> {
        let mailbox = self
            .observers
            .lock()
            .get(&tab)
            .cloned()
            .ok_or(HostError::NoObserver(tab))?;
        let kind = command.kind_name();
        match mailbox.request(command).await? {
            Response::Error { message, .. } => Err(HostError::Rejected {
                command: kind,
                message,
            }),
            _ => Ok(()),
        }
    }

    async fn inject_observer(&self, tab: TabId) -> Result<(), HostError> {
        let injector = self
            .injector
            .as_ref()
            .ok_or(HostError::Unsupported("script injection"))?;
        let mailbox = injector.inject(tab)?;
        self.register(tab, mailbox);
        tracing::debug!(tab_id = %tab, "observer injected");
        Ok(())
    }

    async fn capture_visible_frame(&self, _tab: TabId) -> Result<String, HostError> {
        Err(HostError::Unsupported("visible frame capture"))
    }

    async fn execute_page_probe(&self, _tab: TabId) -> Result<serde_json::Value, HostError> {
        Err(HostError::Unsupported("page probe"))
    }
}

struct WorkerContext {
    mailbox: Mailbox<WorkerCommand, WorkerReply>,
    handle: JoinHandle<()>,
}

impl WorkerContext {
    fn is_alive(&self) -> bool {
        !self.handle.is_finished() && !self.mailbox.is_closed()
    }

    fn shut_down(self) {
        // Dropping the task drops the worker, which releases its tracks
        self.handle.abort();
    }
}

/// Runs the media capture worker as its own task
pub struct LocalCaptureHost {
    backend: Arc<dyn MediaBackend>,
    config: CaptureConfig,
    worker: Mutex<Option<WorkerContext>>,
    next_stream: AtomicU64,
}

impl LocalCaptureHost {
    pub fn new(backend: Arc<dyn MediaBackend>, config: CaptureConfig) -> Self {
        Self {
            backend,
            config,
            worker: Mutex::new(None),
            next_stream: AtomicU64::new(1),
        }
    }

    fn spawn_worker(&self) -> WorkerContext {
        let worker = MediaCaptureWorker::new(Arc::clone(&self.backend), self.config.clone());
        let (mailbox, handle) = worker.spawn();
        WorkerContext { mailbox, handle }
    }
}

#[async_trait]
impl CaptureHost for LocalCaptureHost {
    async fn ensure_worker(&self, purpose: WorkerPurpose) -> Result<(), HostError> {
        let mut slot = self.worker.lock();
        match purpose {
            WorkerPurpose::DisplayCapture => {
                if let Some(existing) = slot.take() {
                    tracing::debug!("replacing capture worker for display capture");
                    existing.shut_down();
                }
            }
            WorkerPurpose::TabCapture => {
                if slot.as_ref().is_some_and(WorkerContext::is_alive) {
                    return Ok(());
                }
            }
        }
        *slot = Some(self.spawn_worker());
        Ok(())
    }

    async fn tab_stream_id(&self, tab: TabId) -> Result<String, HostError> {
        let n = self.next_stream.fetch_add(1, Ordering::Relaxed);
        Ok(format!("tab-{tab}-stream-{n}"))
    }

    async fn send(&self, command: WorkerCommand) -> Result<WorkerReply, HostError> {
        let mailbox = self
            .worker
            .lock()
            .as_ref()
            .filter(|context| context.is_alive())
            .map(|context| context.mailbox.clone())
            .ok_or_else(|| HostError::Worker("no capture worker is running".to_string()))?;
        Ok(mailbox.request(command).await?)
    }

    async fn close_worker(&self) -> Result<(), HostError> {
        if let Some(context) = self.worker.lock().take() {
            context.shut_down();
            tracing::debug!("capture worker closed");
        }
        Ok(())
    }

    fn has_worker(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(WorkerContext::is_alive)
    }
}
