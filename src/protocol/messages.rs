//! Messages exchanged between execution contexts.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::capture::{CapturedVideo, StreamDescriptor};
use crate::console::ConsoleEntry;
use crate::coordinator::{SessionBundle, SessionError, SessionLogs};
use crate::network::PageNetworkLog;
use crate::page::ActionEvent;

/// Host-assigned tab identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub u32);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the capture stream covers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureMode {
    #[default]
    Tab,
    /// Whole screen or window, chosen by the user in a gesture-gated picker
    Fullscreen,
}

/// Which kind of context sent a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContextKind {
    Coordinator,
    TabObserver,
    CaptureWorker,
    /// User-facing trigger (popup, toolbar button, CLI)
    Control,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sender {
    pub context: ContextKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<TabId>,
}

impl Sender {
    pub fn control() -> Self {
        Self {
            context: ContextKind::Control,
            tab_id: None,
        }
    }

    pub fn tab(tab_id: TabId) -> Self {
        Self {
            context: ContextKind::TabObserver,
            tab_id: Some(tab_id),
        }
    }
}

/// Requests handled by the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Request {
    StartSession {
        #[serde(rename = "tabId")]
        tab_id: TabId,
        #[serde(default)]
        mode: CaptureMode,
    },
    StopSession,
    RecordAction {
        action: ActionEvent,
    },
    RecordConsoleLine {
        entry: ConsoleEntry,
    },
    RecordPageNetworkLog {
        log: PageNetworkLog,
    },
    GetState,
    /// Buffered logs of the current (or just stopped) session
    GetSessionLogs,
    CaptureVisibleFrame {
        #[serde(default, rename = "tabId")]
        tab_id: Option<TabId>,
    },
    ExecutePageProbe {
        #[serde(default, rename = "tabId")]
        tab_id: Option<TabId>,
    },
    SessionBundleConsumed,
    CaptureConfirmed,
    CaptureCancelled,
    CaptureFailed {
        error: String,
    },
}

impl Request {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Request::StartSession { .. } => "start-session",
            Request::StopSession => "stop-session",
            Request::RecordAction { .. } => "record-action",
            Request::RecordConsoleLine { .. } => "record-console-line",
            Request::RecordPageNetworkLog { .. } => "record-page-network-log",
            Request::GetState => "get-state",
            Request::GetSessionLogs => "get-session-logs",
            Request::CaptureVisibleFrame { .. } => "capture-visible-frame",
            Request::ExecutePageProbe { .. } => "execute-page-probe",
            Request::SessionBundleConsumed => "session-bundle-consumed",
            Request::CaptureConfirmed => "capture-confirmed",
            Request::CaptureCancelled => "capture-cancelled",
            Request::CaptureFailed { .. } => "capture-failed",
        }
    }
}

/// `{isRecording, startTime}` as observers see it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStatus {
    pub is_recording: bool,
    pub start_time: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    AlreadyRecording,
    NotRecording,
    CaptureProvisioningFailed,
    /// No tab to act on
    NoTargetTab,
    /// A host capability (screenshot, script injection) failed
    HostFailure,
    UnknownMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum Response {
    Ok,
    Stopped {
        bundle: SessionBundle,
    },
    State(RecordingStatus),
    Logs {
        logs: SessionLogs,
    },
    Frame {
        #[serde(rename = "imageData")]
        image_data: String,
    },
    Probe {
        data: serde_json::Value,
    },
    Error {
        code: ErrorCode,
        message: String,
    },
}

impl Response {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Response::Error {
            code,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        !matches!(self, Response::Error { .. })
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Response::Ok => "ok",
            Response::Stopped { .. } => "stopped",
            Response::State(_) => "state",
            Response::Logs { .. } => "logs",
            Response::Frame { .. } => "frame",
            Response::Probe { .. } => "probe",
            Response::Error { .. } => "error",
        }
    }

    /// Turn an error response into a [`ProtocolError::Remote`]
    pub fn into_result(self) -> Result<Response, ProtocolError> {
        match self {
            Response::Error { code, message } => Err(ProtocolError::Remote { code, message }),
            other => Ok(other),
        }
    }
}

impl From<SessionError> for Response {
    fn from(err: SessionError) -> Self {
        let code = match &err {
            SessionError::AlreadyRecording => ErrorCode::AlreadyRecording,
            SessionError::NotRecording => ErrorCode::NotRecording,
            SessionError::CaptureProvisioningFailed(_) => ErrorCode::CaptureProvisioningFailed,
        };
        Response::error(code, err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Unexpected response: expected {expected}, got {got}")]
    Unexpected { expected: &'static str, got: &'static str },
    #[error("{message}")]
    Remote { code: ErrorCode, message: String },
}

/// A request stamped with its origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: Uuid,
    pub sender: Sender,
    pub message: Request,
}

impl Envelope {
    pub fn new(sender: Sender, message: Request) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            message,
        }
    }

    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Commands the coordinator sends to a tab observer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TabCommand {
    /// Liveness probe; an injected observer answers `Ok`
    Ping,
    StartRecording {
        #[serde(rename = "startTime")]
        start_time: u64,
    },
    /// `finalize` is set when this tab owns the capture stream and must emit
    /// the bundle itself.
    StopRecording { finalize: bool },
    /// Ask the page to show the gesture-gated capture prompt
    ShowCapturePrompt { mode: CaptureMode },
}

impl TabCommand {
    pub fn kind_name(&self) -> &'static str {
        match self {
            TabCommand::Ping => "ping",
            TabCommand::StartRecording { .. } => "start-recording",
            TabCommand::StopRecording { .. } => "stop-recording",
            TabCommand::ShowCapturePrompt { .. } => "show-capture-prompt",
        }
    }
}

/// Commands the coordinator sends to the media capture worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorkerCommand {
    Start { descriptor: StreamDescriptor },
    Stop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum WorkerReply {
    Started {
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Stopped {
        captured: CapturedVideo,
    },
    Failed {
        message: String,
    },
}
