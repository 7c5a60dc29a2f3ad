//! Deterministic collaborators for tests
//!
//! Scripted instrumentation, a media backend whose encoders can be poked from
//! the test, a page host that records every command, a manual clock and a
//! bundle consumer that hands bundles back to the test.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use bugreel::capture::MediaCaptureWorker;
//! use bugreel::config::CaptureConfig;
//! use bugreel::host::mock::MockMediaBackend;
//!
//! # async fn demo() {
//! let backend = MockMediaBackend::new();
//! let mut worker = MediaCaptureWorker::new(Arc::new(backend.clone()), CaptureConfig::default());
//! let _ = worker.stop().await;
//! assert_eq!(backend.release_count(), 0);
//! # }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use super::{BundleConsumer, HostError, PageHost};
use crate::capture::{CaptureError, MediaBackend, MediaEncoder, RecorderState, StreamDescriptor};
use crate::coordinator::SessionBundle;
use crate::instrumentation::{Domain, Instrumentation, InstrumentationError};
use crate::network::RequestId;
use crate::page::{ActionEvent, PageContext, RecorderLink};
use crate::protocol::{ChannelError, RecordingStatus, TabCommand, TabId};
use crate::util::Clock;

/// Bytes every mock encoder emits when it is stopped gracefully
pub const FINAL_CHUNK: &[u8] = b"mock-webm-final";

// ---------------------------------------------------------------------------
// Instrumentation

#[derive(Default)]
struct InstrumentationScript {
    attach_error: Option<String>,
    enable_error: Option<(Domain, String)>,
    detach_error: Option<String>,
    detach_delay: Option<Duration>,
    bodies: HashMap<RequestId, Result<String, String>>,
    attached: HashSet<TabId>,
    calls: Vec<String>,
}

#[derive(Clone, Default)]
pub struct MockInstrumentation {
    script: Arc<Mutex<InstrumentationScript>>,
}

impl MockInstrumentation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_attach(&self, message: impl Into<String>) {
        self.script.lock().attach_error = Some(message.into());
    }

    pub fn fail_enable(&self, domain: Domain, message: impl Into<String>) {
        self.script.lock().enable_error = Some((domain, message.into()));
    }

    pub fn fail_detach(&self, message: impl Into<String>) {
        self.script.lock().detach_error = Some(message.into());
    }

    /// Make every detach take `delay` before it answers
    pub fn delay_detach(&self, delay: Duration) {
        self.script.lock().detach_delay = Some(delay);
    }

    pub fn with_body(&self, request_id: &str, body: impl Into<String>) {
        self.script
            .lock()
            .bodies
            .insert(RequestId::new(request_id), Ok(body.into()));
    }

    pub fn fail_body(&self, request_id: &str, message: impl Into<String>) {
        self.script
            .lock()
            .bodies
            .insert(RequestId::new(request_id), Err(message.into()));
    }

    pub fn is_attached(&self, tab: TabId) -> bool {
        self.script.lock().attached.contains(&tab)
    }

    /// Every protocol call in order, e.g. `attach:7`, `Network.enable:7`
    pub fn calls(&self) -> Vec<String> {
        self.script.lock().calls.clone()
    }
}

#[async_trait]
impl Instrumentation for MockInstrumentation {
    async fn attach(&self, tab: TabId) -> Result<(), InstrumentationError> {
        let mut script = self.script.lock();
        script.calls.push(format!("attach:{tab}"));
        if let Some(message) = script.attach_error.clone() {
            return Err(InstrumentationError::Attach(message));
        }
        script.attached.insert(tab);
        Ok(())
    }

    async fn enable(&self, tab: TabId, domain: Domain) -> Result<(), InstrumentationError> {
        let mut script = self.script.lock();
        script
            .calls
            .push(format!("{}:{tab}", domain.enable_command()));
        match &script.enable_error {
            Some((failing, message)) if *failing == domain => Err(InstrumentationError::Enable {
                domain,
                message: message.clone(),
            }),
            _ => Ok(()),
        }
    }

    async fn detach(&self, tab: TabId) -> Result<(), InstrumentationError> {
        let delay = {
            let mut script = self.script.lock();
            script.calls.push(format!("detach:{tab}"));
            script.attached.remove(&tab);
            script.detach_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.script.lock().detach_error.clone() {
            Some(message) => Err(InstrumentationError::Detach(message)),
            None => Ok(()),
        }
    }

    async fn response_body(
        &self,
        tab: TabId,
        request_id: &RequestId,
    ) -> Result<String, InstrumentationError> {
        let mut script = self.script.lock();
        script.calls.push(format!("body:{tab}:{request_id}"));
        match script.bodies.get(request_id) {
            Some(Ok(body)) => Ok(body.clone()),
            Some(Err(message)) => Err(InstrumentationError::BodyFetch(message.clone())),
            None => Err(InstrumentationError::BodyFetch(
                "No resource with given identifier found".to_string(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Media

struct EncoderShared {
    state: RecorderState,
    chunks: Vec<Vec<u8>>,
    release_count: usize,
    stop_calls: usize,
    fail_stop: bool,
}

/// Test-side handle to a mock encoder
#[derive(Clone)]
pub struct MockEncoderHandle {
    shared: Arc<Mutex<EncoderShared>>,
    mime_type: String,
    descriptor: StreamDescriptor,
}

impl MockEncoderHandle {
    pub fn push_chunk(&self, chunk: Vec<u8>) {
        self.shared.lock().chunks.push(chunk);
    }

    pub fn set_state(&self, state: RecorderState) {
        self.shared.lock().state = state;
    }

    pub fn state(&self) -> RecorderState {
        self.shared.lock().state
    }

    pub fn fail_stop(&self) {
        self.shared.lock().fail_stop = true;
    }

    pub fn release_count(&self) -> usize {
        self.shared.lock().release_count
    }

    pub fn stop_calls(&self) -> usize {
        self.shared.lock().stop_calls
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }
}

pub struct MockEncoder {
    handle: MockEncoderHandle,
}

#[async_trait]
impl MediaEncoder for MockEncoder {
    fn mime_type(&self) -> &str {
        &self.handle.mime_type
    }

    fn state(&self) -> RecorderState {
        self.handle.state()
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        self.handle.set_state(RecorderState::Recording);
        Ok(())
    }

    fn take_chunks(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.handle.shared.lock().chunks)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        let mut shared = self.handle.shared.lock();
        shared.stop_calls += 1;
        if shared.fail_stop {
            return Err(CaptureError::Encoder("stop acknowledgment never arrived".into()));
        }
        shared.chunks.push(FINAL_CHUNK.to_vec());
        shared.state = RecorderState::Inactive;
        Ok(())
    }

    fn release_tracks(&mut self) {
        self.handle.shared.lock().release_count += 1;
    }
}

/// Holds the display picker open until the test answers it
pub struct PickerGate {
    answer: oneshot::Sender<bool>,
}

impl PickerGate {
    pub fn confirm(self) {
        let _ = self.answer.send(true);
    }

    pub fn cancel(self) {
        let _ = self.answer.send(false);
    }
}

#[derive(Default)]
struct BackendShared {
    supported: Option<Vec<String>>,
    open_errors: Vec<CaptureError>,
    picker: Option<oneshot::Receiver<bool>>,
    encoders: Vec<MockEncoderHandle>,
}

#[derive(Clone, Default)]
pub struct MockMediaBackend {
    shared: Arc<Mutex<BackendShared>>,
}

impl MockMediaBackend {
    /// Every format is supported and the picker is confirmed right away
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_supported_formats(self, formats: &[&str]) -> Self {
        self.shared.lock().supported = Some(formats.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn fail_next_open(&self, error: CaptureError) {
        self.shared.lock().open_errors.push(error);
    }

    /// The next display capture blocks until the gate is answered
    pub fn gate_picker(&self) -> PickerGate {
        let (answer, rx) = oneshot::channel();
        self.shared.lock().picker = Some(rx);
        PickerGate { answer }
    }

    pub fn encoders(&self) -> Vec<MockEncoderHandle> {
        self.shared.lock().encoders.clone()
    }

    pub fn last_encoder(&self) -> Option<MockEncoderHandle> {
        self.shared.lock().encoders.last().cloned()
    }

    /// Track releases across every encoder ever opened
    pub fn release_count(&self) -> usize {
        self.shared
            .lock()
            .encoders
            .iter()
            .map(MockEncoderHandle::release_count)
            .sum()
    }
}

#[async_trait]
impl MediaBackend for MockMediaBackend {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        match &self.shared.lock().supported {
            Some(formats) => formats.iter().any(|f| f == mime_type),
            None => true,
        }
    }

    async fn open(
        &self,
        descriptor: &StreamDescriptor,
        mime_type: &str,
    ) -> Result<Box<dyn MediaEncoder>, CaptureError> {
        let (error, picker) = {
            let mut shared = self.shared.lock();
            let error = if shared.open_errors.is_empty() {
                None
            } else {
                Some(shared.open_errors.remove(0))
            };
            let picker = match descriptor {
                StreamDescriptor::Display => shared.picker.take(),
                StreamDescriptor::Tab { .. } => None,
            };
            (error, picker)
        };
        if let Some(error) = error {
            return Err(error);
        }
        if let Some(picker) = picker {
            match picker.await {
                Ok(true) => {}
                Ok(false) | Err(_) => return Err(CaptureError::Cancelled),
            }
        }

        let handle = MockEncoderHandle {
            shared: Arc::new(Mutex::new(EncoderShared {
                state: RecorderState::Inactive,
                chunks: Vec::new(),
                release_count: 0,
                stop_calls: 0,
                fail_stop: false,
            })),
            mime_type: mime_type.to_string(),
            descriptor: descriptor.clone(),
        };
        self.shared.lock().encoders.push(handle.clone());
        Ok(Box::new(MockEncoder { handle }))
    }
}

// ---------------------------------------------------------------------------
// Page host

#[derive(Default)]
struct PageScript {
    commands: Vec<(TabId, TabCommand)>,
    observers: HashSet<TabId>,
    hang_pings: bool,
    injection_error: Option<String>,
    rejected: HashMap<&'static str, String>,
    injections: usize,
}

/// Page host that records commands instead of delivering them
#[derive(Clone, Default)]
pub struct MockPageHost {
    script: Arc<Mutex<PageScript>>,
}

impl MockPageHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a tab as already having a live observer
    pub fn with_observer(self, tab: TabId) -> Self {
        self.script.lock().observers.insert(tab);
        self
    }

    /// Pings never answer, as with a frozen page
    pub fn hang_pings(&self) {
        self.script.lock().hang_pings = true;
    }

    pub fn fail_injection(&self, message: impl Into<String>) {
        self.script.lock().injection_error = Some(message.into());
    }

    /// Make the observer reject a command kind (e.g. `show-capture-prompt`)
    pub fn reject(&self, command: &'static str, message: impl Into<String>) {
        self.script.lock().rejected.insert(command, message.into());
    }

    pub fn commands(&self) -> Vec<(TabId, TabCommand)> {
        self.script.lock().commands.clone()
    }

    pub fn commands_for(&self, tab: TabId) -> Vec<TabCommand> {
        self.script
            .lock()
            .commands
            .iter()
            .filter(|(t, _)| *t == tab)
            .map(|(_, command)| command.clone())
            .collect()
    }

    pub fn injections(&self) -> usize {
        self.script.lock().injections
    }
}

#[async_trait]
impl PageHost for MockPageHost {
    async fn send(&self, tab: TabId, command: TabCommand) -> Result<(), HostError> {
        let hang = {
            let mut script = self.script.lock();
            script.commands.push((tab, command.clone()));
            if !script.observers.contains(&tab) {
                return Err(HostError::NoObserver(tab));
            }
            if let Some(message) = script.rejected.get(command.kind_name()) {
                return Err(HostError::Rejected {
                    command: command.kind_name(),
                    message: message.clone(),
                });
            }
            script.hang_pings && command == TabCommand::Ping
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn inject_observer(&self, tab: TabId) -> Result<(), HostError> {
        let mut script = self.script.lock();
        script.injections += 1;
        if let Some(message) = script.injection_error.clone() {
            return Err(HostError::Injection(message));
        }
        script.observers.insert(tab);
        script.hang_pings = false;
        Ok(())
    }

    async fn capture_visible_frame(&self, tab: TabId) -> Result<String, HostError> {
        Ok(format!("data:image/png;base64,ZnJhbWUt{tab}"))
    }

    async fn execute_page_probe(&self, tab: TabId) -> Result<serde_json::Value, HostError> {
        Ok(serde_json::json!({ "tabId": tab, "userAgent": "mock" }))
    }
}

// ---------------------------------------------------------------------------
// Page side

/// Page whose URL the test controls
#[derive(Clone)]
pub struct StaticPage {
    url: Arc<Mutex<String>>,
}

impl StaticPage {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Arc::new(Mutex::new(url.into())),
        }
    }

    pub fn set_url(&self, url: impl Into<String>) {
        *self.url.lock() = url.into();
    }
}

impl PageContext for StaticPage {
    fn current_url(&self) -> String {
        self.url.lock().clone()
    }
}

/// Recorder link that collects actions in memory
#[derive(Clone, Default)]
pub struct MockRecorderLink {
    actions: Arc<Mutex<Vec<ActionEvent>>>,
    invalidated: Arc<AtomicBool>,
    status: Arc<Mutex<RecordingStatus>>,
}

impl MockRecorderLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> Vec<ActionEvent> {
        self.actions.lock().clone()
    }

    /// Subsequent sends fail as if the extension was reloaded
    pub fn invalidate(&self) {
        self.invalidated.store(true, Ordering::SeqCst);
    }

    pub fn revalidate(&self) {
        self.invalidated.store(false, Ordering::SeqCst);
    }

    pub fn set_status(&self, status: RecordingStatus) {
        *self.status.lock() = status;
    }
}

#[async_trait]
impl RecorderLink for MockRecorderLink {
    async fn send_action(&self, action: ActionEvent) -> Result<(), ChannelError> {
        if self.invalidated.load(Ordering::SeqCst) {
            return Err(ChannelError::ContextInvalidated);
        }
        self.actions.lock().push(action);
        Ok(())
    }

    async fn recording_state(&self) -> Result<RecordingStatus, ChannelError> {
        if self.invalidated.load(Ordering::SeqCst) {
            return Err(ChannelError::ContextInvalidated);
        }
        Ok(*self.status.lock())
    }
}

// ---------------------------------------------------------------------------
// Misc

#[derive(Clone)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(now_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(now_ms)),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Bundle consumer that hands every bundle back to the test
pub struct CollectingConsumer {
    tx: mpsc::UnboundedSender<SessionBundle>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<SessionBundle>>,
    fail: AtomicBool,
}

impl Default for CollectingConsumer {
    fn default() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            fail: AtomicBool::new(false),
        }
    }
}

impl CollectingConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_consumption(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// Wait for the next consumed bundle
    pub async fn next_bundle(&self) -> Option<SessionBundle> {
        self.rx.lock().await.recv().await
    }
}

#[async_trait]
impl BundleConsumer for CollectingConsumer {
    async fn consume(&self, bundle: SessionBundle) -> Result<(), HostError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(HostError::Unsupported("bundle delivery"));
        }
        self.tx
            .send(bundle)
            .map_err(|_| HostError::Unsupported("bundle delivery"))
    }
}
