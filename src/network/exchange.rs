use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::events::{Headers, RequestId, RequestWillBeSent, ResourceType, ResponsePayload};

/// How far an exchange has progressed.
///
/// An exchange moves `Sent -> Responded -> Finished|Failed` (the response step
/// may be skipped) and never leaves a terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExchangeStage {
    #[default]
    Sent,
    Responded,
    Finished,
    Failed,
}

impl ExchangeStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExchangeStage::Finished | ExchangeStage::Failed)
    }
}

/// One correlated request/response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkExchange {
    /// Creation order within the session
    pub seq: u64,
    pub request_id: RequestId,
    pub url: String,
    pub method: String,
    pub resource_type: ResourceType,
    pub request_headers: Headers,
    pub request_body: Option<String>,
    /// Protocol send time in milliseconds
    pub sent_at: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<Headers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoded_size: Option<u64>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_json: Option<serde_json::Value>,
    #[serde(default)]
    pub failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,

    #[serde(skip)]
    stage: ExchangeStage,
    #[serde(skip)]
    started: Option<Instant>,
    #[serde(skip)]
    awaiting_body: bool,
}

impl NetworkExchange {
    pub(crate) fn from_request(seq: u64, event: RequestWillBeSent, at: Instant) -> Self {
        Self {
            seq,
            request_id: event.request_id,
            url: event.request.url,
            method: event.request.method,
            resource_type: event.resource_type,
            request_headers: event.request.headers,
            request_body: event.request.post_data,
            sent_at: event.timestamp * 1000.0,
            status: None,
            status_text: None,
            response_headers: None,
            mime_type: None,
            duration_ms: None,
            encoded_size: None,
            body: None,
            parsed_json: None,
            failed: false,
            error_text: None,
            stage: ExchangeStage::Sent,
            started: Some(at),
            awaiting_body: false,
        }
    }

    /// Build an already-complete exchange from a page-hook record
    pub(crate) fn completed(
        seq: u64,
        request_id: RequestId,
        url: String,
        method: String,
        resource_type: ResourceType,
        sent_at: f64,
    ) -> Self {
        Self {
            seq,
            request_id,
            url,
            method,
            resource_type,
            request_headers: Headers::new(),
            request_body: None,
            sent_at,
            status: None,
            status_text: None,
            response_headers: None,
            mime_type: None,
            duration_ms: None,
            encoded_size: None,
            body: None,
            parsed_json: None,
            failed: false,
            error_text: None,
            stage: ExchangeStage::Finished,
            started: None,
            awaiting_body: false,
        }
    }

    pub fn stage(&self) -> ExchangeStage {
        self.stage
    }

    pub fn is_complete(&self) -> bool {
        self.stage.is_terminal() && !self.awaiting_body
    }

    pub(crate) fn is_awaiting_body(&self) -> bool {
        self.awaiting_body
    }

    pub(crate) fn apply_response(&mut self, response: ResponsePayload) -> bool {
        if self.stage != ExchangeStage::Sent {
            return false;
        }
        self.status = Some(response.status);
        self.status_text = Some(response.status_text);
        self.response_headers = Some(response.headers);
        self.mime_type = Some(response.mime_type);
        self.stage = ExchangeStage::Responded;
        true
    }

    pub(crate) fn apply_finished(&mut self, encoded_size: f64, at: Instant) -> bool {
        if self.stage.is_terminal() {
            return false;
        }
        self.duration_ms = Some(self.elapsed_ms(at));
        self.encoded_size = Some(encoded_size.max(0.0) as u64);
        self.stage = ExchangeStage::Finished;
        true
    }

    pub(crate) fn apply_failed(&mut self, error_text: String, at: Instant) -> bool {
        if self.stage.is_terminal() {
            return false;
        }
        self.failed = true;
        self.error_text = Some(error_text);
        self.duration_ms = Some(self.elapsed_ms(at));
        self.stage = ExchangeStage::Failed;
        true
    }

    pub(crate) fn mark_body_omitted(&mut self) {
        self.body = Some(format!(
            "[Response body not captured for {}]",
            self.resource_type
        ));
    }

    pub(crate) fn mark_awaiting_body(&mut self) {
        self.awaiting_body = true;
    }

    /// Store a fetched body (or `None` when the fetch failed) and parse it as
    /// JSON when possible.
    pub(crate) fn set_body(&mut self, body: Option<String>) {
        self.awaiting_body = false;
        self.parsed_json = body
            .as_deref()
            .and_then(|raw| serde_json::from_str::<serde_json::Value>(raw).ok());
        self.body = body;
    }

    fn elapsed_ms(&self, at: Instant) -> u64 {
        self.started
            .map(|started| at.saturating_duration_since(started).as_millis() as u64)
            .unwrap_or_default()
    }
}
