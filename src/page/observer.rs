//! Per-tab observer context.
//!
//! Hosts the action recorder, forwards page-hook console and network records,
//! and in the in-page topology owns the capture stream itself: it answers the
//! capture prompt and, when told to finalize, emits the bundle.

use std::sync::Arc;

use tokio::task::JoinHandle;

use super::recorder::{ActionRecorder, DomEvent};
use crate::capture::{CaptureError, MediaCaptureWorker, StreamDescriptor};
use crate::console::ConsoleEntry;
use crate::coordinator::{SessionBundle, SessionLogs};
use crate::host::BundleConsumer;
use crate::network::PageNetworkLog;
use crate::protocol::{
    mailbox, ContextLink, ErrorCode, Mailbox, Request, Response, TabCommand, TabId,
};

const OBSERVER_MAILBOX_CAPACITY: usize = 16;

/// Capture stream held inside the page
pub struct PageCapture {
    worker: tokio::sync::Mutex<MediaCaptureWorker>,
    consumer: Arc<dyn BundleConsumer>,
}

impl PageCapture {
    pub fn new(worker: MediaCaptureWorker, consumer: Arc<dyn BundleConsumer>) -> Self {
        Self {
            worker: tokio::sync::Mutex::new(worker),
            consumer,
        }
    }
}

#[derive(Clone)]
pub struct TabObserver {
    inner: Arc<ObserverInner>,
}

struct ObserverInner {
    tab_id: TabId,
    recorder: ActionRecorder,
    link: ContextLink,
    capture: Option<Arc<PageCapture>>,
}

impl TabObserver {
    pub fn new(
        tab_id: TabId,
        recorder: ActionRecorder,
        link: ContextLink,
        capture: Option<PageCapture>,
    ) -> Self {
        Self {
            inner: Arc::new(ObserverInner {
                tab_id,
                recorder,
                link,
                capture: capture.map(Arc::new),
            }),
        }
    }

    pub fn tab_id(&self) -> TabId {
        self.inner.tab_id
    }

    pub fn recorder(&self) -> &ActionRecorder {
        &self.inner.recorder
    }

    pub async fn dom_event(&self, event: DomEvent) {
        self.inner.recorder.handle(event).await;
    }

    /// Console line captured by a page hook
    pub async fn forward_console_line(&self, entry: ConsoleEntry) {
        if let Err(err) = self.inner.link.send(Request::RecordConsoleLine { entry }).await {
            tracing::debug!(error = %err, "failed to forward console line");
        }
    }

    /// Request/response record captured by a page hook
    pub async fn forward_network_log(&self, log: PageNetworkLog) {
        if let Err(err) = self.inner.link.send(Request::RecordPageNetworkLog { log }).await {
            tracing::debug!(error = %err, "failed to forward network log");
        }
    }

    pub async fn handle_command(&self, command: TabCommand) -> Response {
        match command {
            TabCommand::Ping => Response::Ok,
            TabCommand::StartRecording { start_time } => {
                self.inner.recorder.start();
                tracing::debug!(tab_id = %self.inner.tab_id, start_time, "recording started");
                Response::Ok
            }
            TabCommand::StopRecording { finalize } => {
                self.inner.recorder.stop();
                match (&self.inner.capture, finalize) {
                    (Some(capture), true) => {
                        tokio::spawn(finalize_bundle(
                            Arc::clone(capture),
                            self.inner.link.clone(),
                        ));
                    }
                    (Some(capture), false) => {
                        tokio::spawn(discard_capture(Arc::clone(capture)));
                    }
                    (None, true) => {
                        tracing::warn!(tab_id = %self.inner.tab_id, "asked to finalize without a capture stream");
                    }
                    (None, false) => {}
                }
                Response::Ok
            }
            TabCommand::ShowCapturePrompt { mode } => {
                let Some(capture) = &self.inner.capture else {
                    return Response::error(
                        ErrorCode::CaptureProvisioningFailed,
                        "page capture is not available in this tab",
                    );
                };
                tracing::debug!(tab_id = %self.inner.tab_id, ?mode, "showing capture prompt");
                tokio::spawn(run_capture_prompt(
                    Arc::clone(capture),
                    self.inner.link.clone(),
                ));
                Response::Ok
            }
        }
    }

    /// Run as a context. Recording resumes on its own if a session is
    /// already active for this tab.
    pub fn spawn(&self) -> (Mailbox<TabCommand, Response>, JoinHandle<()>) {
        let (mailbox, mut inbox) = mailbox(OBSERVER_MAILBOX_CAPACITY);

        let restoring = self.clone();
        tokio::spawn(async move {
            restoring.inner.recorder.resume_if_active().await;
        });

        let observer = self.clone();
        let handle = tokio::spawn(async move {
            while let Some(incoming) = inbox.recv().await {
                let (command, responder) = incoming.into_parts();
                let reply = observer.handle_command(command).await;
                responder.respond(reply);
            }
        });
        (mailbox, handle)
    }
}

async fn run_capture_prompt(capture: Arc<PageCapture>, link: ContextLink) {
    let result = {
        let mut worker = capture.worker.lock().await;
        worker.start(StreamDescriptor::Display).await
    };
    let report = match result {
        Ok(_) => Request::CaptureConfirmed,
        Err(CaptureError::Cancelled) => Request::CaptureCancelled,
        Err(err) => Request::CaptureFailed {
            error: err.to_string(),
        },
    };
    if let Err(err) = link.send(report).await {
        tracing::warn!(error = %err, "could not report capture prompt outcome");
    }
}

/// Drop a stream nobody will collect
async fn discard_capture(capture: Arc<PageCapture>) {
    let mut worker = capture.worker.lock().await;
    if worker.state().is_some() {
        let captured = worker.stop().await;
        tracing::debug!(outcome = ?captured.outcome, "discarded page capture");
    }
}

async fn finalize_bundle(capture: Arc<PageCapture>, link: ContextLink) {
    let captured = capture.worker.lock().await.stop().await;

    let logs = match link.send(Request::GetSessionLogs).await {
        Ok(Response::Logs { logs }) => logs,
        Ok(other) => {
            tracing::warn!(response = other.kind_name(), "unexpected reply to get-session-logs");
            SessionLogs::default()
        }
        Err(err) => {
            tracing::warn!(error = %err, "could not fetch session logs");
            SessionLogs::default()
        }
    };

    let bundle = SessionBundle::new(captured.video, logs);
    if let Err(err) = capture.consumer.consume(bundle).await {
        // Logs stay retained in the coordinator without the ack
        tracing::error!(error = %err, "bundle consumer failed");
        return;
    }
    if let Err(err) = link.send(Request::SessionBundleConsumed).await {
        tracing::debug!(error = %err, "failed to acknowledge bundle");
    }
}
