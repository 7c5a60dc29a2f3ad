//! Network-domain instrumentation payloads.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub type Headers = BTreeMap<String, String>;

/// Protocol-assigned request identifier, unique within a session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resource type as reported by the instrumentation protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResourceType {
    Document,
    Stylesheet,
    Image,
    Media,
    Font,
    Script,
    TextTrack,
    #[serde(rename = "XHR")]
    Xhr,
    Fetch,
    Prefetch,
    EventSource,
    WebSocket,
    Manifest,
    SignedExchange,
    Ping,
    #[serde(rename = "CSPViolationReport")]
    CspViolationReport,
    Preflight,
    #[default]
    #[serde(other)]
    Other,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Document => "Document",
            ResourceType::Stylesheet => "Stylesheet",
            ResourceType::Image => "Image",
            ResourceType::Media => "Media",
            ResourceType::Font => "Font",
            ResourceType::Script => "Script",
            ResourceType::TextTrack => "TextTrack",
            ResourceType::Xhr => "XHR",
            ResourceType::Fetch => "Fetch",
            ResourceType::Prefetch => "Prefetch",
            ResourceType::EventSource => "EventSource",
            ResourceType::WebSocket => "WebSocket",
            ResourceType::Manifest => "Manifest",
            ResourceType::SignedExchange => "SignedExchange",
            ResourceType::Ping => "Ping",
            ResourceType::CspViolationReport => "CSPViolationReport",
            ResourceType::Preflight => "Preflight",
            ResourceType::Other => "Other",
        }
    }

    /// Map the coarse content category reported by page-level hooks
    pub fn from_page_category(category: &str) -> Self {
        match category {
            "js" => ResourceType::Script,
            "css" => ResourceType::Stylesheet,
            "html" => ResourceType::Document,
            "img" => ResourceType::Image,
            "font" => ResourceType::Font,
            "json" | "xml" | "text" => ResourceType::Fetch,
            _ => ResourceType::Other,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPayload {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub post_data: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestWillBeSent {
    pub request_id: RequestId,
    pub request: RequestPayload,
    #[serde(rename = "type", default)]
    pub resource_type: ResourceType,
    /// Protocol timestamp in seconds
    #[serde(default)]
    pub timestamp: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePayload {
    pub status: u16,
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub mime_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseReceived {
    pub request_id: RequestId,
    pub response: ResponsePayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingFinished {
    pub request_id: RequestId,
    #[serde(default)]
    pub encoded_data_length: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingFailed {
    pub request_id: RequestId,
    #[serde(default)]
    pub error_text: String,
    #[serde(default)]
    pub canceled: bool,
}

/// The four event kinds the correlator folds into exchanges
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    RequestSent(RequestWillBeSent),
    ResponseReceived(ResponseReceived),
    LoadingFinished(LoadingFinished),
    LoadingFailed(LoadingFailed),
}

impl NetworkEvent {
    pub fn request_id(&self) -> &RequestId {
        match self {
            NetworkEvent::RequestSent(e) => &e.request_id,
            NetworkEvent::ResponseReceived(e) => &e.request_id,
            NetworkEvent::LoadingFinished(e) => &e.request_id,
            NetworkEvent::LoadingFailed(e) => &e.request_id,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            NetworkEvent::RequestSent(_) => "request-sent",
            NetworkEvent::ResponseReceived(_) => "response-received",
            NetworkEvent::LoadingFinished(_) => "loading-finished",
            NetworkEvent::LoadingFailed(_) => "loading-failed",
        }
    }
}

/// A complete request/response record produced by page-level fetch/XHR hooks
/// where the instrumentation protocol is unavailable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageNetworkLog {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub status_text: Option<String>,
    /// Coarse category derived from the content type (`json`, `js`, `img`, ...)
    #[serde(rename = "type", default)]
    pub category: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(rename = "time", default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub request_headers: Headers,
    #[serde(default)]
    pub request_body: Option<String>,
    #[serde(default)]
    pub response_headers: Headers,
    #[serde(rename = "response", default)]
    pub body: Option<String>,
    #[serde(default)]
    pub failed: bool,
    #[serde(default)]
    pub error_text: Option<String>,
}
