//! Recording session coordinator.
//!
//! Single source of truth for the session lifecycle. Mediates between the tab
//! observer, the capture worker and the instrumentation protocol, and writes
//! the persisted subset of the session on every transition so a restarted
//! coordinator can still stop what an evicted one started.

use std::future::Future;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::bundle::{LogBuffer, SessionBundle, SessionLogs};
use super::error::SessionError;
use crate::capture::{CaptureError, CapturedVideo, StreamDescriptor};
use crate::config::{CaptureTopology, Config};
use crate::console::{ConsoleEntry, SelfLogFilter};
use crate::host::{CaptureHost, HostError, PageHost, WorkerPurpose};
use crate::instrumentation::{
    Domain, Instrumentation, InstrumentationError, InstrumentationEvent, Observed,
};
use crate::network::{Ingest, PageNetworkLog};
use crate::page::ActionEvent;
use crate::protocol::{CaptureMode, RecordingStatus, TabCommand, TabId, WorkerCommand, WorkerReply};
use crate::session::{Session, SessionPhase, StateStore};
use crate::util::Clock;

/// External collaborators the coordinator drives
#[derive(Clone)]
pub struct CoordinatorDeps {
    pub page: Arc<dyn PageHost>,
    pub capture: Arc<dyn CaptureHost>,
    pub instrumentation: Arc<dyn Instrumentation>,
    pub store: Arc<dyn StateStore>,
    pub clock: Arc<dyn Clock>,
}

/// Context currently holding the live capture stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOwner {
    Worker,
    Tab(TabId),
}

#[derive(Debug)]
enum PickerAnswer {
    Confirmed,
    Cancelled,
    Failed(String),
}

struct CoordinatorState {
    session: Session,
    /// Bumped on every start so stale continuations can tell they lost
    generation: u64,
    logs: LogBuffer,
    stream_owner: Option<CaptureOwner>,
    pending_picker: Option<oneshot::Sender<PickerAnswer>>,
    teardown: Option<JoinHandle<()>>,
    /// The owning tab acknowledged its bundle before the stop finished
    bundle_consumed: bool,
}

struct Inner {
    config: Config,
    deps: CoordinatorDeps,
    self_filter: SelfLogFilter,
    state: Mutex<CoordinatorState>,
    /// Stops run one at a time
    stop_gate: tokio::sync::Mutex<()>,
}

struct StopPlan {
    was_recording: bool,
    tab: Option<TabId>,
    owner: Option<CaptureOwner>,
    attached: bool,
    generation: u64,
}

#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    pub fn new(config: Config, deps: CoordinatorDeps) -> Self {
        let self_filter = SelfLogFilter::new(config.self_log_prefix.clone());
        let logs = LogBuffer::new(&config.network);
        Self {
            inner: Arc::new(Inner {
                config,
                deps,
                self_filter,
                state: Mutex::new(CoordinatorState {
                    session: Session::idle(),
                    generation: 0,
                    logs,
                    stream_owner: None,
                    pending_picker: None,
                    teardown: None,
                    bundle_consumed: false,
                }),
                stop_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub(crate) fn deps(&self) -> &CoordinatorDeps {
        &self.inner.deps
    }

    fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.inner.state.lock()
    }

    /// Copy of the current session
    pub fn session(&self) -> Session {
        self.lock().session.clone()
    }

    pub fn get_state(&self) -> RecordingStatus {
        self.lock().session.status()
    }

    pub fn session_logs(&self) -> SessionLogs {
        self.lock().logs.snapshot()
    }

    /// Reload the persisted session after a restart. Only applies while idle.
    pub async fn restore(&self) {
        let record = match self.inner.deps.store.load().await {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(err) => {
                tracing::warn!(error = %err, "failed to load persisted session");
                return;
            }
        };
        let restored = Session::restore(&record);
        if restored.is_idle() {
            if record.is_recording {
                tracing::info!("discarding persisted session that never confirmed");
                self.persist().await;
            }
            return;
        }
        let adopted = {
            let mut state = self.lock();
            if state.session.is_idle() {
                state.session = restored;
                true
            } else {
                false
            }
        };
        if adopted {
            tracing::info!(
                tab_id = ?record.tab_id,
                start_time = ?record.start_time,
                pending = record.pending_user_confirmation,
                "restored persisted session"
            );
        }
    }

    async fn persist(&self) {
        let record = self.lock().session.persisted();
        let store = &self.inner.deps.store;
        let result = if record.is_recording {
            store.save(&record).await
        } else {
            store.clear().await
        };
        if let Err(err) = result {
            tracing::warn!(error = %err, "failed to persist session state");
        }
    }

    // -----------------------------------------------------------------------
    // Start

    pub async fn request_start(&self, tab: TabId, mode: CaptureMode) -> Result<(), SessionError> {
        let generation = {
            let mut state = self.lock();
            let next = state.session.clone().begin(tab, mode)?;
            state.session = next;
            state.generation += 1;
            state.logs.clear();
            state.bundle_consumed = false;
            state.stream_owner = None;
            if let Some(teardown) = state.teardown.take() {
                teardown.abort();
            }
            state.generation
        };
        tracing::info!(tab_id = %tab, ?mode, "starting recording session");
        self.persist().await;

        self.ensure_observer(tab).await;

        let owner = match self.provision(tab, mode, generation).await {
            Ok(owner) => owner,
            Err(err) => {
                tracing::warn!(tab_id = %tab, error = %err, "session start failed, rolling back");
                self.rollback(generation).await;
                return Err(err);
            }
        };

        // Only now does the session get a start time, so picker wait is excluded
        let start_time = self.inner.deps.clock.now_ms();
        let activated = {
            let mut state = self.lock();
            let starting = matches!(
                state.session.phase(),
                SessionPhase::Initializing | SessionPhase::PendingUserConfirmation
            );
            if state.generation == generation && starting {
                state.session = state.session.clone().activate(start_time);
                state.stream_owner = Some(owner);
                true
            } else {
                false
            }
        };
        if !activated {
            tracing::warn!(tab_id = %tab, "session cancelled while its stream was acquired");
            self.release_orphaned_stream(owner).await;
            return Err(SessionError::provisioning("session was cancelled during start"));
        }
        self.persist().await;

        self.begin_observing(tab, start_time, generation).await;
        tracing::info!(tab_id = %tab, start_time, "recording session active");
        Ok(())
    }

    /// Ping the observer and inject it if it does not answer in time.
    /// Injection failure is not fatal; capture can run without actions.
    async fn ensure_observer(&self, tab: TabId) {
        let page = &self.inner.deps.page;
        let timing = self.inner.config.timing;
        match tokio::time::timeout(timing.ping_timeout, page.send(tab, TabCommand::Ping)).await {
            Ok(Ok(())) => return,
            Ok(Err(err)) => {
                tracing::debug!(tab_id = %tab, error = %err, "observer ping failed, injecting");
            }
            Err(_) => {
                tracing::debug!(tab_id = %tab, "observer ping timed out, injecting");
            }
        }
        if let Err(err) = page.inject_observer(tab).await {
            tracing::warn!(tab_id = %tab, error = %err, "observer injection failed");
            return;
        }
        tokio::time::sleep(timing.inject_settle).await;
    }

    async fn provision(
        &self,
        tab: TabId,
        mode: CaptureMode,
        generation: u64,
    ) -> Result<CaptureOwner, SessionError> {
        let capture = &self.inner.deps.capture;
        match (self.inner.config.topology, mode) {
            (CaptureTopology::Worker, CaptureMode::Tab) => {
                capture
                    .ensure_worker(WorkerPurpose::TabCapture)
                    .await
                    .map_err(SessionError::provisioning)?;
                let stream_id = capture
                    .tab_stream_id(tab)
                    .await
                    .map_err(SessionError::provisioning)?;
                self.start_worker(StreamDescriptor::Tab { stream_id }).await?;
                Ok(CaptureOwner::Worker)
            }
            (CaptureTopology::Worker, CaptureMode::Fullscreen) => {
                capture
                    .ensure_worker(WorkerPurpose::DisplayCapture)
                    .await
                    .map_err(SessionError::provisioning)?;
                self.await_confirmation(generation).await;
                self.with_picker_timeout(self.start_worker(StreamDescriptor::Display))
                    .await?;
                Ok(CaptureOwner::Worker)
            }
            (CaptureTopology::InPage, _) => {
                let (answer_tx, answer_rx) = oneshot::channel();
                {
                    let mut state = self.lock();
                    if state.generation == generation {
                        state.pending_picker = Some(answer_tx);
                    }
                }
                self.await_confirmation(generation).await;
                self.inner
                    .deps
                    .page
                    .send(tab, TabCommand::ShowCapturePrompt { mode })
                    .await
                    .map_err(SessionError::provisioning)?;

                let answer = self
                    .with_picker_timeout(async move {
                        answer_rx
                            .await
                            .map_err(|_| SessionError::provisioning("capture prompt was abandoned"))
                    })
                    .await?;
                match answer {
                    PickerAnswer::Confirmed => Ok(CaptureOwner::Tab(tab)),
                    PickerAnswer::Cancelled => {
                        Err(SessionError::provisioning(CaptureError::Cancelled))
                    }
                    PickerAnswer::Failed(message) => Err(SessionError::provisioning(message)),
                }
            }
        }
    }

    async fn start_worker(&self, descriptor: StreamDescriptor) -> Result<(), SessionError> {
        match self
            .inner
            .deps
            .capture
            .send(WorkerCommand::Start { descriptor })
            .await
        {
            Ok(WorkerReply::Started { mime_type }) => {
                tracing::debug!(mime_type = %mime_type, "capture worker recording");
                Ok(())
            }
            Ok(WorkerReply::Failed { message }) => Err(SessionError::provisioning(message)),
            Ok(WorkerReply::Stopped { .. }) => Err(SessionError::provisioning(
                "capture worker answered start with a stop",
            )),
            Err(err) => Err(SessionError::provisioning(err)),
        }
    }

    async fn with_picker_timeout<T>(
        &self,
        picking: impl Future<Output = Result<T, SessionError>>,
    ) -> Result<T, SessionError> {
        match self.inner.config.timing.picker_timeout {
            Some(limit) => tokio::time::timeout(limit, picking)
                .await
                .unwrap_or_else(|_| Err(SessionError::provisioning("capture picker timed out"))),
            None => picking.await,
        }
    }

    async fn await_confirmation(&self, generation: u64) {
        let changed = {
            let mut state = self.lock();
            if state.generation == generation
                && state.session.phase() == SessionPhase::Initializing
            {
                state.session = state.session.clone().await_confirmation();
                true
            } else {
                false
            }
        };
        if changed {
            self.persist().await;
        }
    }

    async fn rollback(&self, generation: u64) {
        let rolled_back = {
            let mut state = self.lock();
            if state.generation == generation && !state.session.is_idle() {
                state.session = Session::idle();
                state.stream_owner = None;
                state.pending_picker = None;
                true
            } else {
                false
            }
        };
        if rolled_back {
            self.persist().await;
        }
    }

    async fn release_orphaned_stream(&self, owner: CaptureOwner) {
        let result = match owner {
            CaptureOwner::Worker => self.inner.deps.capture.close_worker().await,
            CaptureOwner::Tab(tab) => {
                self.inner
                    .deps
                    .page
                    .send(tab, TabCommand::StopRecording { finalize: false })
                    .await
            }
        };
        if let Err(err) = result {
            tracing::debug!(error = %err, "failed to release orphaned capture stream");
        }
    }

    /// Tell the observer to record and attach instrumentation. Neither step
    /// can fail the session.
    async fn begin_observing(&self, tab: TabId, start_time: u64, generation: u64) {
        if let Err(err) = self
            .inner
            .deps
            .page
            .send(tab, TabCommand::StartRecording { start_time })
            .await
        {
            tracing::warn!(tab_id = %tab, error = %err, "observer did not start recording");
        }

        let attached = self.attach_instrumentation(tab).await;
        let mut state = self.lock();
        if state.generation == generation && state.session.tab_id() == Some(tab) {
            state.session.set_instrumentation_attached(attached);
        }
    }

    async fn attach_instrumentation(&self, tab: TabId) -> bool {
        let instrumentation = &self.inner.deps.instrumentation;
        if let Err(err) = instrumentation.attach(tab).await {
            log_attach_failure(tab, &err);
            return false;
        }
        for domain in Domain::CAPTURE {
            if let Err(err) = instrumentation.enable(tab, domain).await {
                log_attach_failure(tab, &err);
                if let Err(detach_err) = instrumentation.detach(tab).await {
                    tracing::debug!(tab_id = %tab, error = %detach_err, "detach after failed enable");
                }
                return false;
            }
        }
        tracing::info!(tab_id = %tab, "instrumentation attached");
        true
    }

    // -----------------------------------------------------------------------
    // Stop

    pub async fn request_stop(&self) -> Result<SessionBundle, SessionError> {
        // A concurrent stop waits here and then finds the session idle
        let _stopping = self.inner.stop_gate.lock().await;

        // A restarted coordinator starts idle; re-derive truth from storage
        let locally_idle = self.lock().session.is_idle();
        if locally_idle {
            self.restore().await;
        }

        if self.cancel_pending_start().await {
            return Err(SessionError::NotRecording);
        }

        let plan = {
            let mut state = self.lock();
            let was_recording =
                state.session.phase() == SessionPhase::Active && state.session.is_recording();
            if was_recording {
                state.session = state.session.clone().begin_stop();
            }
            let tab = state.session.tab_id();
            StopPlan {
                was_recording,
                tab,
                owner: state.stream_owner.or_else(|| self.derive_owner(tab)),
                attached: state.session.instrumentation_attached(),
                generation: state.generation,
            }
        };
        if plan.was_recording {
            self.persist().await;
        }

        let captured = self.finalize_capture(&plan).await;
        let worker_active = captured.as_ref().is_some_and(CapturedVideo::had_activity);

        if self.inner.config.topology == CaptureTopology::Worker {
            self.schedule_teardown();
        }

        if !plan.was_recording && !worker_active {
            let reset = {
                let mut state = self.lock();
                let stale = state.generation == plan.generation && !state.session.is_idle();
                if stale {
                    state.session = Session::idle();
                    state.stream_owner = None;
                }
                stale
            };
            if reset {
                self.persist().await;
            }
            return Err(SessionError::NotRecording);
        }
        if !plan.was_recording {
            tracing::info!("capture worker was still recording without a local session, salvaging");
        }

        if let Some(tab) = plan.tab {
            if plan.owner != Some(CaptureOwner::Tab(tab)) {
                if let Err(err) = self
                    .inner
                    .deps
                    .page
                    .send(tab, TabCommand::StopRecording { finalize: false })
                    .await
                {
                    tracing::debug!(tab_id = %tab, error = %err, "could not notify observer of stop");
                }
            }
            if plan.attached {
                if let Err(err) = self.inner.deps.instrumentation.detach(tab).await {
                    tracing::warn!(tab_id = %tab, error = %err, "instrumentation detach failed");
                }
            }
        }

        let bundle = {
            let mut state = self.lock();
            // The owning tab fetches logs after this returns; keep them until it acks
            let logs = match self.inner.config.topology {
                CaptureTopology::InPage if !state.bundle_consumed => state.logs.snapshot(),
                _ => state.logs.take(),
            };
            state.bundle_consumed = false;
            if state.generation == plan.generation {
                state.session = Session::idle();
                state.stream_owner = None;
            }
            SessionBundle::new(captured.and_then(|captured| captured.video), logs)
        };
        self.persist().await;

        tracing::info!(
            actions = bundle.actions.len(),
            network = bundle.network_logs.len(),
            console = bundle.console_logs.len(),
            video = bundle.has_video(),
            "recording session stopped"
        );
        Ok(bundle)
    }

    fn derive_owner(&self, tab: Option<TabId>) -> Option<CaptureOwner> {
        match self.inner.config.topology {
            CaptureTopology::Worker => Some(CaptureOwner::Worker),
            CaptureTopology::InPage => tab.map(CaptureOwner::Tab),
        }
    }

    /// Stop during initialization cancels the start instead.
    async fn cancel_pending_start(&self) -> bool {
        let cancelled = {
            let mut state = self.lock();
            let starting = matches!(
                state.session.phase(),
                SessionPhase::Initializing | SessionPhase::PendingUserConfirmation
            );
            if starting {
                if let Some(picker) = state.pending_picker.take() {
                    let _ = picker.send(PickerAnswer::Cancelled);
                }
                state.session = Session::idle();
                state.stream_owner = None;
            }
            starting
        };
        if !cancelled {
            return false;
        }
        tracing::info!("stop requested before capture was confirmed, cancelling start");
        if self.inner.config.topology == CaptureTopology::Worker {
            if let Err(err) = self.inner.deps.capture.close_worker().await {
                tracing::debug!(error = %err, "failed to close capture worker");
            }
        }
        self.persist().await;
        true
    }

    /// Ask the stream owner to finalize. Returns the worker's video when the
    /// worker owns the stream; an owning tab emits the bundle itself.
    async fn finalize_capture(&self, plan: &StopPlan) -> Option<CapturedVideo> {
        match plan.owner {
            Some(CaptureOwner::Tab(tab)) => {
                if let Err(err) = self
                    .inner
                    .deps
                    .page
                    .send(tab, TabCommand::StopRecording { finalize: true })
                    .await
                {
                    tracing::warn!(tab_id = %tab, error = %err, "owning tab did not accept finalize");
                }
                None
            }
            Some(CaptureOwner::Worker) => self.stop_worker().await,
            None => None,
        }
    }

    async fn stop_worker(&self) -> Option<CapturedVideo> {
        let capture = &self.inner.deps.capture;
        let limit = self.inner.config.timing.worker_stop_timeout;
        match tokio::time::timeout(limit, capture.send(WorkerCommand::Stop)).await {
            Ok(Ok(WorkerReply::Stopped { captured })) => {
                tracing::debug!(outcome = ?captured.outcome, "capture worker stopped");
                Some(captured)
            }
            Ok(Ok(other)) => {
                tracing::warn!(reply = ?other, "unexpected capture worker reply to stop");
                None
            }
            Ok(Err(HostError::Worker(message))) => {
                tracing::debug!(%message, "no capture worker to stop");
                None
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "capture worker stop failed");
                None
            }
            Err(_) => {
                tracing::warn!(timeout = ?limit, "capture worker did not stop in time");
                None
            }
        }
    }

    fn schedule_teardown(&self) {
        let capture = Arc::clone(&self.inner.deps.capture);
        let grace = self.inner.config.timing.teardown_grace;
        let task = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            match capture.close_worker().await {
                Ok(()) => tracing::debug!("capture worker torn down after grace window"),
                Err(err) => tracing::debug!(error = %err, "capture worker teardown failed"),
            }
        });
        if let Some(previous) = self.lock().teardown.replace(task) {
            previous.abort();
        }
    }

    /// The context that emitted the bundle is done with the retained logs
    pub async fn session_bundle_consumed(&self) {
        {
            let mut state = self.lock();
            if let Some(teardown) = state.teardown.take() {
                teardown.abort();
            }
            match state.session.phase() {
                SessionPhase::Idle => state.logs.clear(),
                // The stop in flight releases the logs once it has built its bundle
                SessionPhase::Stopping => state.bundle_consumed = true,
                _ => {}
            }
        }
        if let Err(err) = self.inner.deps.capture.close_worker().await {
            tracing::debug!(error = %err, "capture worker teardown failed");
        }
        tracing::debug!("session bundle consumed");
    }

    // -----------------------------------------------------------------------
    // Capture prompt outcomes

    fn answer_picker(&self, answer: PickerAnswer) -> bool {
        match self.lock().pending_picker.take() {
            Some(picker) => picker.send(answer).is_ok(),
            None => false,
        }
    }

    /// Whether the persisted/local session is waiting on `sender`'s picker
    fn pending_for(&self, sender_tab: Option<TabId>) -> bool {
        let state = self.lock();
        state.session.phase() == SessionPhase::PendingUserConfirmation
            && sender_tab.is_some()
            && state.session.tab_id() == sender_tab
    }

    pub async fn capture_confirmed(&self, sender_tab: Option<TabId>) {
        if self.answer_picker(PickerAnswer::Confirmed) {
            return;
        }
        // Nobody is waiting: this coordinator restarted while the picker was open
        self.restore().await;
        let late = {
            let mut state = self.lock();
            match sender_tab {
                Some(tab)
                    if state.session.phase() == SessionPhase::PendingUserConfirmation
                        && state.session.tab_id() == Some(tab) =>
                {
                    let start_time = self.inner.deps.clock.now_ms();
                    state.session = state.session.clone().activate(start_time);
                    state.stream_owner = Some(CaptureOwner::Tab(tab));
                    Some((tab, start_time, state.generation))
                }
                _ => None,
            }
        };
        match late {
            Some((tab, start_time, generation)) => {
                tracing::info!(tab_id = %tab, "late capture confirmation activated session");
                self.persist().await;
                self.begin_observing(tab, start_time, generation).await;
            }
            None => {
                tracing::warn!(tab_id = ?sender_tab, "capture confirmed with no pending start");
                if let Some(tab) = sender_tab {
                    self.release_orphaned_stream(CaptureOwner::Tab(tab)).await;
                }
            }
        }
    }

    pub async fn capture_cancelled(&self, sender_tab: Option<TabId>) {
        self.abandon_picker(sender_tab, PickerAnswer::Cancelled).await;
    }

    pub async fn capture_failed(&self, sender_tab: Option<TabId>, error: String) {
        tracing::warn!(tab_id = ?sender_tab, %error, "page capture failed");
        self.abandon_picker(sender_tab, PickerAnswer::Failed(error)).await;
    }

    async fn abandon_picker(&self, sender_tab: Option<TabId>, answer: PickerAnswer) {
        if self.answer_picker(answer) {
            return;
        }
        self.restore().await;
        if !self.pending_for(sender_tab) {
            return;
        }
        {
            let mut state = self.lock();
            state.session = Session::idle();
            state.stream_owner = None;
        }
        tracing::info!(tab_id = ?sender_tab, "pending session abandoned after restart");
        self.persist().await;
    }

    // -----------------------------------------------------------------------
    // Ingestion

    fn accepts_from(session: &Session, tab: Option<TabId>) -> bool {
        session.is_recording() && tab.is_some() && session.tab_id() == tab
    }

    pub fn record_action(&self, sender_tab: Option<TabId>, action: ActionEvent) -> bool {
        let mut state = self.lock();
        if !Self::accepts_from(&state.session, sender_tab) {
            tracing::trace!(tab_id = ?sender_tab, "ignoring action outside the recording tab");
            return false;
        }
        state.logs.actions.push(action);
        true
    }

    pub fn record_console_line(&self, sender_tab: Option<TabId>, entry: ConsoleEntry) -> bool {
        if !self.inner.self_filter.accepts(&entry.text) {
            return false;
        }
        let mut state = self.lock();
        if !Self::accepts_from(&state.session, sender_tab) {
            return false;
        }
        state.logs.console.push(entry);
        true
    }

    pub fn record_page_network_log(&self, sender_tab: Option<TabId>, log: PageNetworkLog) -> bool {
        let now = self.inner.deps.clock.now_ms();
        let mut state = self.lock();
        if !Self::accepts_from(&state.session, sender_tab) {
            return false;
        }
        state.logs.network.record_page_log(log, now as f64);
        true
    }

    /// Fold one instrumentation event into the session logs. Events must be
    /// fed in arrival order; a body fetch runs in the returned task.
    pub fn on_instrumentation_event(
        &self,
        tab: TabId,
        event: InstrumentationEvent,
    ) -> Option<JoinHandle<()>> {
        let now = self.inner.deps.clock.now_ms();
        let network_event = match event.into_observed(now) {
            Observed::Console(entry) => {
                self.record_console_line(Some(tab), entry);
                return None;
            }
            Observed::Network(network_event) => network_event,
        };

        let outcome = {
            let mut state = self.lock();
            if !Self::accepts_from(&state.session, Some(tab)) {
                return None;
            }
            state.logs.network.apply(network_event, Instant::now())
        };
        let Ingest::NeedsBody(request_id) = outcome else {
            return None;
        };

        let coordinator = self.clone();
        Some(tokio::spawn(async move {
            let result = coordinator
                .inner
                .deps
                .instrumentation
                .response_body(tab, &request_id)
                .await;
            coordinator
                .lock()
                .logs
                .network
                .attach_body(&request_id, result);
        }))
    }

    /// Feed a tab's instrumentation event stream in order
    pub fn pump_instrumentation(
        &self,
        tab: TabId,
        mut events: mpsc::Receiver<InstrumentationEvent>,
    ) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                coordinator.on_instrumentation_event(tab, event);
            }
        })
    }

    /// Host reported the protocol connection went away (tab closed, user
    /// dismissed the debugging banner)
    pub fn on_instrumentation_detached(&self, tab: TabId) {
        let mut state = self.lock();
        if state.session.tab_id() == Some(tab) && state.session.instrumentation_attached() {
            state.session.set_instrumentation_attached(false);
            tracing::info!(tab_id = %tab, "instrumentation detached by host");
        }
    }
}

fn log_attach_failure(tab: TabId, err: &InstrumentationError) {
    if err.is_restricted_page() {
        tracing::warn!(tab_id = %tab, error = %err, "console and network capture unavailable on restricted page");
    } else {
        tracing::error!(tab_id = %tab, error = %err, "instrumentation attach failed, continuing without console and network capture");
    }
}
