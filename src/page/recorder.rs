//! Turns noisy DOM events into a clean interaction timeline.
//!
//! Clicks and committed values are shipped immediately. Typing is debounced
//! per element. A click schedules a delayed URL comparison to catch
//! client-side routing, and page unload performs a final one.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::action::{ActionEvent, ActionKind};
use super::element::{ElementKey, ElementSnapshot};
use crate::config::RecorderConfig;
use crate::protocol::{ChannelError, ContextLink, RecordingStatus, Request, Response};
use crate::util::{truncate_chars, Clock};

/// DOM events the recorder listens to
#[derive(Debug, Clone)]
pub enum DomEvent {
    Click(ElementSnapshot),
    Input(ElementSnapshot),
    Change(ElementSnapshot),
    BeforeUnload,
}

/// Read access to the page the recorder lives in
pub trait PageContext: Send + Sync {
    fn current_url(&self) -> String;
}

/// The recorder's channel to the coordinator
#[async_trait]
pub trait RecorderLink: Send + Sync {
    async fn send_action(&self, action: ActionEvent) -> Result<(), ChannelError>;

    async fn recording_state(&self) -> Result<RecordingStatus, ChannelError>;
}

#[async_trait]
impl RecorderLink for ContextLink {
    async fn send_action(&self, action: ActionEvent) -> Result<(), ChannelError> {
        match self.send(Request::RecordAction { action }).await? {
            Response::Error { message, .. } => {
                tracing::debug!(%message, "coordinator rejected action");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn recording_state(&self) -> Result<RecordingStatus, ChannelError> {
        match self.send(Request::GetState).await? {
            Response::State(status) => Ok(status),
            other => {
                tracing::debug!(response = other.kind_name(), "unexpected get-state response");
                Ok(RecordingStatus::default())
            }
        }
    }
}

#[derive(Clone)]
pub struct ActionRecorder {
    inner: Arc<Inner>,
}

struct Inner {
    config: RecorderConfig,
    page: Arc<dyn PageContext>,
    link: Arc<dyn RecorderLink>,
    clock: Arc<dyn Clock>,
    state: Mutex<RecorderState>,
}

#[derive(Default)]
struct RecorderState {
    recording: bool,
    last_url: String,
    next_generation: u64,
    typing_timers: HashMap<ElementKey, PendingTyping>,
    settle_timers: Vec<JoinHandle<()>>,
}

struct PendingTyping {
    generation: u64,
    timer: JoinHandle<()>,
}

impl RecorderState {
    fn cancel_timers(&mut self) {
        for (_, pending) in self.typing_timers.drain() {
            pending.timer.abort();
        }
        for timer in self.settle_timers.drain(..) {
            timer.abort();
        }
    }
}

impl ActionRecorder {
    pub fn new(
        config: RecorderConfig,
        page: Arc<dyn PageContext>,
        link: Arc<dyn RecorderLink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                page,
                link,
                clock,
                state: Mutex::new(RecorderState::default()),
            }),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.inner.state.lock().recording
    }

    /// Returns false if already recording.
    pub fn start(&self) -> bool {
        let url = self.inner.page.current_url();
        let mut state = self.inner.state.lock();
        if state.recording {
            return false;
        }
        state.recording = true;
        state.last_url = url;
        tracing::debug!(url = %state.last_url, "action recorder started");
        true
    }

    /// Returns false if not recording. Pending typing is discarded.
    pub fn stop(&self) -> bool {
        self.inner.stop()
    }

    /// Resume recording if the coordinator says a session is active, used
    /// right after injection into a page that was already being recorded.
    pub async fn resume_if_active(&self) -> bool {
        match self.inner.link.recording_state().await {
            Ok(status) if status.is_recording => self.start(),
            Ok(_) => false,
            Err(err) => {
                tracing::debug!(error = %err, "could not restore recorder state");
                false
            }
        }
    }

    pub async fn handle(&self, event: DomEvent) {
        if !self.is_recording() {
            return;
        }
        match event {
            DomEvent::Click(element) => {
                self.schedule_navigation_check();
                let action = self.inner.element_action(ActionKind::Click, &element, None);
                self.inner.emit(action).await;
            }
            DomEvent::Input(element) => {
                if element.is_text_entry() {
                    self.schedule_typing(element);
                }
            }
            DomEvent::Change(element) => {
                let value = self.inner.committed_value(&element);
                let action = self.inner.element_action(ActionKind::Input, &element, value);
                self.inner.emit(action).await;
            }
            DomEvent::BeforeUnload => {
                Inner::check_navigation(&self.inner).await;
            }
        }
    }

    fn schedule_typing(&self, element: ElementSnapshot) {
        let key = element.key();
        let inner = Arc::clone(&self.inner);
        let debounce = self.inner.config.typing_debounce;

        let mut state = self.inner.state.lock();
        let generation = state.next_generation;
        state.next_generation += 1;
        if let Some(previous) = state.typing_timers.remove(&key) {
            previous.timer.abort();
        }

        let timer_key = key.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let still_current = {
                let mut state = inner.state.lock();
                let current = state
                    .typing_timers
                    .get(&timer_key)
                    .is_some_and(|pending| pending.generation == generation);
                if current {
                    state.typing_timers.remove(&timer_key);
                }
                current && state.recording
            };
            if still_current {
                let value = inner.typed_value(&element);
                let action = inner.element_action(ActionKind::Typing, &element, value);
                inner.emit(action).await;
            }
        });
        state
            .typing_timers
            .insert(key, PendingTyping { generation, timer });
    }

    fn schedule_navigation_check(&self) {
        let inner = Arc::clone(&self.inner);
        let settle = self.inner.config.navigation_settle;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            Inner::check_navigation(&inner).await;
        });
        let mut state = self.inner.state.lock();
        state.settle_timers.retain(|timer| !timer.is_finished());
        state.settle_timers.push(timer);
    }
}

impl Inner {
    fn stop(&self) -> bool {
        let mut state = self.state.lock();
        if !state.recording {
            return false;
        }
        state.recording = false;
        state.cancel_timers();
        tracing::debug!("action recorder stopped");
        true
    }

    async fn check_navigation(inner: &Arc<Inner>) {
        let url = inner.page.current_url();
        let changed = {
            let mut state = inner.state.lock();
            if state.recording && state.last_url != url {
                state.last_url = url.clone();
                true
            } else {
                false
            }
        };
        if changed {
            let action = ActionEvent::navigation(url, inner.clock.now_ms());
            inner.emit(action).await;
        }
    }

    fn element_action(
        &self,
        kind: ActionKind,
        element: &ElementSnapshot,
        value: Option<String>,
    ) -> ActionEvent {
        ActionEvent {
            kind,
            timestamp: self.clock.now_ms(),
            page_url: self.page.current_url(),
            element: Some(element.describe(self.config.readable_name_max_chars)),
            value,
        }
    }

    fn redact_or_truncate(&self, element: &ElementSnapshot, value: &str) -> String {
        if element.is_password() {
            self.config.redaction_marker.clone()
        } else {
            truncate_chars(value, self.config.value_max_chars)
        }
    }

    /// Live value for inputs, text for contenteditable regions
    fn typed_value(&self, element: &ElementSnapshot) -> Option<String> {
        let raw = element
            .value
            .as_deref()
            .or(element.text_content.as_deref())?;
        Some(self.redact_or_truncate(element, raw))
    }

    fn committed_value(&self, element: &ElementSnapshot) -> Option<String> {
        if element.is_password() {
            return Some(self.config.redaction_marker.clone());
        }
        element
            .value
            .as_deref()
            .filter(|value| !value.is_empty())
            .map(|value| self.redact_or_truncate(element, value))
    }

    async fn emit(&self, action: ActionEvent) {
        let kind = action.kind;
        match self.link.send_action(action).await {
            Ok(()) => {}
            Err(ChannelError::ContextInvalidated) => {
                tracing::warn!("host context invalidated, stopping action recorder");
                self.stop();
            }
            Err(err) => {
                tracing::debug!(error = %err, action = kind.as_str(), "failed to ship action");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::host::mock::{ManualClock, MockRecorderLink, StaticPage};

    struct Harness {
        recorder: ActionRecorder,
        link: MockRecorderLink,
        page: StaticPage,
    }

    fn harness() -> Harness {
        let link = MockRecorderLink::new();
        let page = StaticPage::new("https://app.test/home");
        let recorder = ActionRecorder::new(
            RecorderConfig::default(),
            Arc::new(page.clone()),
            Arc::new(link.clone()),
            Arc::new(ManualClock::new(1_000)),
        );
        assert!(recorder.start());
        Harness {
            recorder,
            link,
            page,
        }
    }

    fn search_box(value: &str) -> ElementSnapshot {
        ElementSnapshot::new("INPUT")
            .with_attr("id", "search")
            .with_attr("type", "text")
            .with_value(value)
    }

    async fn settle() {
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn keystrokes_coalesce_into_one_typing_action() {
        let h = harness();
        let text = "hello world, again!!";
        for i in 1..=text.len() {
            h.recorder.handle(DomEvent::Input(search_box(&text[..i]))).await;
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(h.link.actions().is_empty());

        tokio::time::sleep(Duration::from_millis(300)).await;
        settle().await;

        let actions = h.link.actions();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, ActionKind::Typing);
        assert_eq!(actions[0].value.as_deref(), Some(text));
    }

    #[tokio::test(start_paused = true)]
    async fn keystrokes_past_the_window_are_separate() {
        let h = harness();
        h.recorder.handle(DomEvent::Input(search_box("a"))).await;
        tokio::time::sleep(Duration::from_millis(310)).await;
        h.recorder.handle(DomEvent::Input(search_box("ab"))).await;
        tokio::time::sleep(Duration::from_millis(310)).await;
        settle().await;

        let values: Vec<_> = h
            .link
            .actions()
            .into_iter()
            .map(|action| action.value.unwrap_or_default())
            .collect();
        assert_eq!(values, vec!["a", "ab"]);
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_is_per_element() {
        let h = harness();
        let other = ElementSnapshot::new("TEXTAREA")
            .at_index(2)
            .with_value("notes");
        h.recorder.handle(DomEvent::Input(search_box("q"))).await;
        h.recorder.handle(DomEvent::Input(other)).await;
        tokio::time::sleep(Duration::from_millis(350)).await;
        settle().await;
        assert_eq!(h.link.actions().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn password_values_are_redacted() {
        let h = harness();
        let field = ElementSnapshot::new("INPUT")
            .with_attr("type", "password")
            .with_attr("name", "pw");
        for i in 1..="secret123".len() {
            let typed = field.clone().with_value(&"secret123"[..i]);
            h.recorder.handle(DomEvent::Input(typed)).await;
        }
        h.recorder
            .handle(DomEvent::Change(field.with_value("secret123")))
            .await;
        tokio::time::sleep(Duration::from_millis(400)).await;
        settle().await;

        let actions = h.link.actions();
        assert_eq!(actions.len(), 2);
        for action in &actions {
            assert_eq!(action.value.as_deref(), Some("***"));
        }
        let serialized = serde_json::to_string(&actions).unwrap();
        assert!(!serialized.contains("secret123"));
    }

    #[tokio::test(start_paused = true)]
    async fn long_values_are_truncated() {
        let h = harness();
        let long = "x".repeat(250);
        h.recorder
            .handle(DomEvent::Change(search_box(&long)))
            .await;
        let actions = h.link.actions();
        assert_eq!(actions[0].value.as_ref().map(|v| v.chars().count()), Some(100));
    }

    #[tokio::test(start_paused = true)]
    async fn click_then_route_change_records_navigation() {
        let h = harness();
        let link = ElementSnapshot::new("A").with_text("Settings");
        h.recorder.handle(DomEvent::Click(link)).await;
        h.page.set_url("https://app.test/settings");
        tokio::time::sleep(Duration::from_millis(150)).await;
        settle().await;

        let actions = h.link.actions();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].kind, ActionKind::Click);
        assert_eq!(actions[1].kind, ActionKind::Navigation);
        assert_eq!(actions[1].page_url, "https://app.test/settings");
    }

    #[tokio::test(start_paused = true)]
    async fn click_without_route_change_records_only_click() {
        let h = harness();
        h.recorder
            .handle(DomEvent::Click(ElementSnapshot::new("BUTTON")))
            .await;
        h.recorder.handle(DomEvent::BeforeUnload).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        settle().await;
        assert_eq!(h.link.actions().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unload_records_pending_navigation() {
        let h = harness();
        h.page.set_url("https://other.test/");
        h.recorder.handle(DomEvent::BeforeUnload).await;
        let actions = h.link.actions();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, ActionKind::Navigation);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidated_context_stops_recorder() {
        let h = harness();
        h.link.invalidate();
        h.recorder
            .handle(DomEvent::Click(ElementSnapshot::new("BUTTON")))
            .await;
        assert!(!h.recorder.is_recording());

        h.link.revalidate();
        h.recorder
            .handle(DomEvent::Click(ElementSnapshot::new("BUTTON")))
            .await;
        assert!(h.link.actions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_discards_pending_typing() {
        let h = harness();
        h.recorder.handle(DomEvent::Input(search_box("abc"))).await;
        assert!(h.recorder.stop());
        tokio::time::sleep(Duration::from_millis(400)).await;
        settle().await;
        assert!(h.link.actions().is_empty());
    }

    #[tokio::test]
    async fn resumes_when_session_is_active() {
        let link = MockRecorderLink::new();
        link.set_status(RecordingStatus {
            is_recording: true,
            start_time: Some(5),
        });
        let recorder = ActionRecorder::new(
            RecorderConfig::default(),
            Arc::new(StaticPage::new("https://app.test/")),
            Arc::new(link),
            Arc::new(ManualClock::new(0)),
        );
        assert!(recorder.resume_if_active().await);
        assert!(recorder.is_recording());
    }
}
