//! Host debugging protocol used to observe console and network activity.

use std::fmt;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::console::ConsoleEntry;
use crate::network::{
    LoadingFailed, LoadingFinished, NetworkEvent, RequestId, RequestWillBeSent, ResponseReceived,
};
use crate::protocol::TabId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstrumentationError {
    #[error("Failed to attach instrumentation: {0}")]
    Attach(String),
    #[error("Failed to enable {domain} domain: {message}")]
    Enable { domain: Domain, message: String },
    #[error("Failed to detach instrumentation: {0}")]
    Detach(String),
    #[error("Failed to fetch response body: {0}")]
    BodyFetch(String),
}

impl InstrumentationError {
    /// Whether the failure comes from the page hosting content the protocol
    /// may not touch (extension frames, internal pages).
    pub fn is_restricted_page(&self) -> bool {
        let message = match self {
            InstrumentationError::Attach(message)
            | InstrumentationError::Detach(message)
            | InstrumentationError::BodyFetch(message) => message,
            InstrumentationError::Enable { message, .. } => message,
        };
        restricted_pattern().is_some_and(|re| re.is_match(message))
    }
}

fn restricted_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"(?i)chrome-extension|chrome://|devtools://|cannot access|not allowed").ok()
        })
        .as_ref()
}

/// Protocol domains enabled after attaching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Console,
    Runtime,
    Network,
}

impl Domain {
    pub const CAPTURE: [Domain; 3] = [Domain::Console, Domain::Runtime, Domain::Network];

    pub fn enable_command(&self) -> &'static str {
        match self {
            Domain::Console => "Console.enable",
            Domain::Runtime => "Runtime.enable",
            Domain::Network => "Network.enable",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Domain::Console => "Console",
            Domain::Runtime => "Runtime",
            Domain::Network => "Network",
        };
        f.write_str(name)
    }
}

/// Per-tab connection to the instrumentation protocol
#[async_trait]
pub trait Instrumentation: Send + Sync {
    async fn attach(&self, tab: TabId) -> Result<(), InstrumentationError>;

    async fn enable(&self, tab: TabId, domain: Domain) -> Result<(), InstrumentationError>;

    async fn detach(&self, tab: TabId) -> Result<(), InstrumentationError>;

    async fn response_body(
        &self,
        tab: TabId,
        request_id: &RequestId,
    ) -> Result<String, InstrumentationError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleMessage {
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleMessageAdded {
    pub message: ConsoleMessage,
}

/// Subset of a protocol remote object needed to render console arguments
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteObject {
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub description: Option<String>,
}

impl RemoteObject {
    fn render(&self) -> String {
        match &self.value {
            Some(serde_json::Value::String(text)) => text.clone(),
            Some(serde_json::Value::Null) | None => self.description.clone().unwrap_or_default(),
            Some(other) => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleApiCalled {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub args: Vec<RemoteObject>,
    /// Epoch milliseconds
    #[serde(default)]
    pub timestamp: f64,
}

/// An event pushed by the instrumentation protocol, in its wire shape
/// (`{"method": ..., "params": ...}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum InstrumentationEvent {
    #[serde(rename = "Network.requestWillBeSent")]
    RequestWillBeSent(RequestWillBeSent),
    #[serde(rename = "Network.responseReceived")]
    ResponseReceived(ResponseReceived),
    #[serde(rename = "Network.loadingFinished")]
    LoadingFinished(LoadingFinished),
    #[serde(rename = "Network.loadingFailed")]
    LoadingFailed(LoadingFailed),
    #[serde(rename = "Console.messageAdded")]
    ConsoleMessageAdded(ConsoleMessageAdded),
    #[serde(rename = "Runtime.consoleAPICalled")]
    ConsoleApiCalled(ConsoleApiCalled),
}

/// An instrumentation event sorted by the log it feeds
#[derive(Debug, Clone)]
pub enum Observed {
    Network(NetworkEvent),
    Console(ConsoleEntry),
}

impl InstrumentationEvent {
    /// `now_ms` stamps console lines whose event carries no timestamp.
    pub fn into_observed(self, now_ms: u64) -> Observed {
        match self {
            InstrumentationEvent::RequestWillBeSent(e) => {
                Observed::Network(NetworkEvent::RequestSent(e))
            }
            InstrumentationEvent::ResponseReceived(e) => {
                Observed::Network(NetworkEvent::ResponseReceived(e))
            }
            InstrumentationEvent::LoadingFinished(e) => {
                Observed::Network(NetworkEvent::LoadingFinished(e))
            }
            InstrumentationEvent::LoadingFailed(e) => {
                Observed::Network(NetworkEvent::LoadingFailed(e))
            }
            InstrumentationEvent::ConsoleMessageAdded(added) => Observed::Console(
                ConsoleEntry::new(added.message.level, added.message.text, now_ms),
            ),
            InstrumentationEvent::ConsoleApiCalled(call) => {
                let text = call
                    .args
                    .iter()
                    .map(RemoteObject::render)
                    .collect::<Vec<_>>()
                    .join(" ");
                let timestamp = if call.timestamp > 0.0 {
                    call.timestamp as u64
                } else {
                    now_ms
                };
                Observed::Console(ConsoleEntry::new(call.kind, text, timestamp))
            }
        }
    }
}
