//! Session lifecycle as an owned value.
//!
//! `Idle -> Initializing -> (PendingUserConfirmation) -> Active -> Stopping -> Idle`.
//! Transitions consume the session and return the next one; the coordinator
//! holds the only copy.

use serde::{Deserialize, Serialize};

use crate::coordinator::SessionError;
use crate::protocol::{CaptureMode, RecordingStatus, TabId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionPhase {
    #[default]
    Idle,
    /// Capture and observer are being provisioned
    Initializing,
    /// Waiting on the gesture-gated picker
    PendingUserConfirmation,
    Active,
    /// Teardown in progress; buffered data is still served
    Stopping,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    phase: SessionPhase,
    tab_id: Option<TabId>,
    start_time: Option<u64>,
    is_fullscreen_mode: bool,
    instrumentation_attached: bool,
}

impl Session {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn tab_id(&self) -> Option<TabId> {
        self.tab_id
    }

    pub fn start_time(&self) -> Option<u64> {
        self.start_time
    }

    pub fn is_fullscreen_mode(&self) -> bool {
        self.is_fullscreen_mode
    }

    pub fn instrumentation_attached(&self) -> bool {
        self.instrumentation_attached
    }

    pub fn is_idle(&self) -> bool {
        self.phase == SessionPhase::Idle
    }

    /// Active or stopping with a confirmed start time
    pub fn is_recording(&self) -> bool {
        matches!(self.phase, SessionPhase::Active | SessionPhase::Stopping)
            && self.start_time.is_some()
    }

    pub fn begin(self, tab_id: TabId, mode: CaptureMode) -> Result<Session, SessionError> {
        if !self.is_idle() {
            return Err(SessionError::AlreadyRecording);
        }
        Ok(Session {
            phase: SessionPhase::Initializing,
            tab_id: Some(tab_id),
            start_time: None,
            is_fullscreen_mode: mode == CaptureMode::Fullscreen,
            instrumentation_attached: false,
        })
    }

    pub fn await_confirmation(self) -> Session {
        Session {
            phase: SessionPhase::PendingUserConfirmation,
            ..self
        }
    }

    pub fn activate(self, start_time: u64) -> Session {
        Session {
            phase: SessionPhase::Active,
            start_time: Some(start_time),
            ..self
        }
    }

    pub fn with_instrumentation(self, attached: bool) -> Session {
        Session {
            instrumentation_attached: attached,
            ..self
        }
    }

    pub fn begin_stop(self) -> Session {
        Session {
            phase: SessionPhase::Stopping,
            ..self
        }
    }

    pub fn set_instrumentation_attached(&mut self, attached: bool) {
        self.instrumentation_attached = attached;
    }

    /// What observers see. A session waiting on the picker reports not
    /// recording so no timer is shown before a start time exists.
    pub fn status(&self) -> RecordingStatus {
        if self.is_recording() {
            RecordingStatus {
                is_recording: true,
                start_time: self.start_time,
            }
        } else {
            RecordingStatus::default()
        }
    }

    pub fn persisted(&self) -> PersistedSession {
        PersistedSession {
            is_recording: !self.is_idle(),
            is_fullscreen_mode: self.is_fullscreen_mode,
            tab_id: self.tab_id,
            start_time: self.start_time,
            pending_user_confirmation: self.phase == SessionPhase::PendingUserConfirmation,
        }
    }

    /// Rebuild a session after the coordinator restarted. A record caught
    /// mid-initialization (no start time, no picker) lost its start call and
    /// comes back idle.
    pub fn restore(record: &PersistedSession) -> Session {
        if !record.is_recording {
            return Session::idle();
        }
        let phase = if record.pending_user_confirmation {
            SessionPhase::PendingUserConfirmation
        } else if record.start_time.is_some() {
            SessionPhase::Active
        } else {
            return Session::idle();
        };
        Session {
            phase,
            tab_id: record.tab_id,
            start_time: record.start_time,
            is_fullscreen_mode: record.is_fullscreen_mode,
            instrumentation_attached: false,
        }
    }
}

/// The subset of a session that survives coordinator eviction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    pub is_recording: bool,
    #[serde(default)]
    pub is_fullscreen_mode: bool,
    #[serde(default)]
    pub tab_id: Option<TabId>,
    #[serde(default)]
    pub start_time: Option<u64>,
    #[serde(default)]
    pub pending_user_confirmation: bool,
}
