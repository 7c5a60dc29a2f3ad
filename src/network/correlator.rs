//! Reassembles asynchronous network instrumentation events into complete
//! request/response records.
//!
//! The protocol only guarantees that "request sent" precedes every other event
//! for the same identifier. Anything referencing an identifier that was never
//! seen is dropped without error.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::time::Instant;

use super::events::{NetworkEvent, PageNetworkLog, RequestId, ResourceType};
use super::exchange::NetworkExchange;
use crate::config::NetworkConfig;
use crate::instrumentation::InstrumentationError;
use crate::util::truncate_chars;

const TRUNCATED_SUFFIX: &str = "... [truncated]";

/// Retrieves response bodies through the instrumentation protocol
#[async_trait]
pub trait BodyFetcher: Send + Sync {
    async fn fetch_body(&self, request_id: &RequestId) -> Result<String, InstrumentationError>;
}

/// What happened to an event handed to [`NetworkCorrelator::apply`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingest {
    Created,
    Updated,
    /// The exchange finished and its body should be fetched, then handed back
    /// through [`NetworkCorrelator::attach_body`].
    NeedsBody(RequestId),
    /// Identifier never seen on "request sent"
    Unknown,
    /// Exchange already in a terminal stage
    Stale,
}

#[derive(Debug)]
pub struct NetworkCorrelator {
    exchanges: HashMap<RequestId, NetworkExchange>,
    next_seq: u64,
    static_types: Vec<ResourceType>,
    page_body_max_chars: usize,
}

impl NetworkCorrelator {
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            exchanges: HashMap::new(),
            next_seq: 0,
            static_types: config.static_resource_types.clone(),
            page_body_max_chars: config.page_body_max_chars,
        }
    }

    pub fn is_static(&self, resource_type: ResourceType) -> bool {
        self.static_types.contains(&resource_type)
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    pub fn get(&self, request_id: &RequestId) -> Option<&NetworkExchange> {
        self.exchanges.get(request_id)
    }

    /// Fold one event into the correlator state.
    pub fn apply(&mut self, event: NetworkEvent, at: Instant) -> Ingest {
        match event {
            NetworkEvent::RequestSent(sent) => {
                let seq = self.allocate_seq();
                let id = sent.request_id.clone();
                // Redirects reuse the identifier; the latest hop wins.
                if self.exchanges.contains_key(&id) {
                    tracing::debug!(request_id = %id, "request id reused, replacing exchange");
                }
                self.exchanges
                    .insert(id, NetworkExchange::from_request(seq, sent, at));
                Ingest::Created
            }
            NetworkEvent::ResponseReceived(received) => {
                let Some(exchange) = self.exchanges.get_mut(&received.request_id) else {
                    return unknown(&received.request_id, "response-received");
                };
                if exchange.apply_response(received.response) {
                    Ingest::Updated
                } else {
                    Ingest::Stale
                }
            }
            NetworkEvent::LoadingFinished(finished) => {
                let static_type = {
                    let Some(exchange) = self.exchanges.get(&finished.request_id) else {
                        return unknown(&finished.request_id, "loading-finished");
                    };
                    self.is_static(exchange.resource_type)
                };
                let Some(exchange) = self.exchanges.get_mut(&finished.request_id) else {
                    return Ingest::Unknown;
                };
                if !exchange.apply_finished(finished.encoded_data_length, at) {
                    return Ingest::Stale;
                }
                if static_type {
                    exchange.mark_body_omitted();
                    Ingest::Updated
                } else {
                    exchange.mark_awaiting_body();
                    Ingest::NeedsBody(finished.request_id)
                }
            }
            NetworkEvent::LoadingFailed(failed) => {
                let Some(exchange) = self.exchanges.get_mut(&failed.request_id) else {
                    return unknown(&failed.request_id, "loading-failed");
                };
                if exchange.apply_failed(failed.error_text, at) {
                    Ingest::Updated
                } else {
                    Ingest::Stale
                }
            }
        }
    }

    /// Complete a body fetch requested by [`Ingest::NeedsBody`]. A failed
    /// fetch stores a null body. Returns false if the exchange is gone (the
    /// session was drained meanwhile) or was not waiting for a body.
    pub fn attach_body(
        &mut self,
        request_id: &RequestId,
        result: Result<String, InstrumentationError>,
    ) -> bool {
        let Some(exchange) = self.exchanges.get_mut(request_id) else {
            tracing::debug!(request_id = %request_id, "body arrived after exchange was flushed");
            return false;
        };
        if !exchange.is_awaiting_body() {
            return false;
        }
        match result {
            Ok(body) => exchange.set_body(Some(body)),
            Err(err) => {
                tracing::debug!(request_id = %request_id, error = %err, "response body fetch failed");
                exchange.set_body(None);
            }
        }
        true
    }

    /// Apply an event and, when needed, fetch the body inline. Suitable when
    /// the caller owns the correlator exclusively for the duration of the fetch.
    pub async fn ingest(
        &mut self,
        event: NetworkEvent,
        fetcher: &dyn BodyFetcher,
    ) -> Ingest {
        let outcome = self.apply(event, Instant::now());
        if let Ingest::NeedsBody(request_id) = &outcome {
            let result = fetcher.fetch_body(request_id).await;
            self.attach_body(request_id, result);
        }
        outcome
    }

    /// Record a complete exchange reported by page-level hooks.
    pub fn record_page_log(&mut self, log: PageNetworkLog, sent_at: f64) -> u64 {
        let seq = self.allocate_seq();
        let request_id = RequestId::new(format!("page-{seq}"));
        let resource_type = log
            .category
            .as_deref()
            .map(ResourceType::from_page_category)
            .unwrap_or_default();

        let mut exchange = NetworkExchange::completed(
            seq,
            request_id.clone(),
            log.url,
            log.method,
            resource_type,
            sent_at,
        );
        exchange.request_headers = log.request_headers;
        exchange.request_body = log.request_body;
        exchange.duration_ms = log.duration_ms;
        if log.failed {
            exchange.failed = true;
            exchange.error_text = log.error_text;
        } else {
            exchange.status = log.status;
            exchange.status_text = log.status_text;
            exchange.response_headers = Some(log.response_headers);
            exchange.mime_type = log.content_type;
            let body = log.body.map(|body| self.cap_page_body(body));
            exchange.set_body(body);
        }

        self.exchanges.insert(request_id, exchange);
        seq
    }

    /// All exchanges in creation order, leaving the state untouched
    pub fn snapshot(&self) -> Vec<NetworkExchange> {
        let mut all: Vec<NetworkExchange> = self.exchanges.values().cloned().collect();
        all.sort_by_key(|exchange| exchange.seq);
        all
    }

    /// Flush all exchanges in creation order and reset
    pub fn drain(&mut self) -> Vec<NetworkExchange> {
        let mut all: Vec<NetworkExchange> = self.exchanges.drain().map(|(_, v)| v).collect();
        all.sort_by_key(|exchange| exchange.seq);
        self.next_seq = 0;
        all
    }

    pub fn clear(&mut self) {
        self.exchanges.clear();
        self.next_seq = 0;
    }

    fn allocate_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn cap_page_body(&self, body: String) -> String {
        if body.chars().count() <= self.page_body_max_chars {
            return body;
        }
        let mut capped = truncate_chars(&body, self.page_body_max_chars);
        capped.push_str(TRUNCATED_SUFFIX);
        capped
    }
}

fn unknown(request_id: &RequestId, kind: &str) -> Ingest {
    tracing::trace!(request_id = %request_id, kind, "dropping event for unknown exchange");
    Ingest::Unknown
}
