//! Property tests for network exchange correlation
//!
//! After N requests are sent, their response, finish and fail events arrive
//! interleaved across requests, mixed with events for identifiers that were
//! never sent. Every request ends up as exactly one exchange, in send order.

use bugreel::config::NetworkConfig;
use bugreel::instrumentation::{InstrumentationError, InstrumentationEvent, Observed};
use bugreel::network::{Ingest, NetworkCorrelator, NetworkEvent, RequestId};
use proptest::prelude::*;
use tokio::time::Instant;

fn network(value: serde_json::Value) -> NetworkEvent {
    let event: InstrumentationEvent = serde_json::from_value(value).unwrap();
    match event.into_observed(0) {
        Observed::Network(event) => event,
        Observed::Console(entry) => panic!("Expected network event, got {:?}", entry),
    }
}

fn id(i: usize) -> String {
    format!("req-{i}")
}

fn url(i: usize) -> String {
    format!("https://app.test/{i}")
}

fn sent(i: usize, resource_type: &str) -> NetworkEvent {
    network(serde_json::json!({
        "method": "Network.requestWillBeSent",
        "params": {
            "requestId": id(i),
            "type": resource_type,
            "timestamp": i as f64,
            "request": {"url": url(i), "method": "GET"}
        }
    }))
}

fn responded(request_id: &str, status: u16) -> NetworkEvent {
    network(serde_json::json!({
        "method": "Network.responseReceived",
        "params": {"requestId": request_id, "response": {"status": status}}
    }))
}

fn finished(request_id: &str) -> NetworkEvent {
    network(serde_json::json!({
        "method": "Network.loadingFinished",
        "params": {"requestId": request_id, "encodedDataLength": 10.0}
    }))
}

fn failed(request_id: &str) -> NetworkEvent {
    network(serde_json::json!({
        "method": "Network.loadingFailed",
        "params": {"requestId": request_id, "errorText": "net::ERR_FAILED"}
    }))
}

#[derive(Debug, Clone)]
struct Request {
    /// XHR requests get their bodies fetched, images never do
    fetched: bool,
    status: u16,
    fails: bool,
    /// Whether the body fetch succeeds, for fetched requests
    body_available: bool,
}

impl Request {
    fn resource_type(&self) -> &'static str {
        if self.fetched {
            "XHR"
        } else {
            "Image"
        }
    }

    fn step_count(&self) -> usize {
        if self.fails {
            1
        } else {
            2
        }
    }

    fn body(i: usize) -> String {
        format!(r#"{{"item":{i}}}"#)
    }
}

/// One event slot in the interleaved stream
#[derive(Debug, Clone, Copy)]
enum Slot {
    /// Next pending event of request `i`
    Request(usize),
    /// Event for an identifier nobody sent: 0 response, 1 finish, 2 fail
    Ghost(u8),
}

fn request() -> impl Strategy<Value = Request> {
    (any::<bool>(), 200u16..600, any::<bool>(), any::<bool>()).prop_map(
        |(fetched, status, fails, body_available)| Request {
            fetched,
            status,
            fails,
            body_available,
        },
    )
}

fn scenario() -> impl Strategy<Value = (Vec<Request>, Vec<Slot>)> {
    (
        prop::collection::vec(request(), 1..24),
        prop::collection::vec(0u8..3, 0..8),
    )
        .prop_flat_map(|(requests, ghosts)| {
            let mut slots: Vec<Slot> = requests
                .iter()
                .enumerate()
                .flat_map(|(i, request)| std::iter::repeat(Slot::Request(i)).take(request.step_count()))
                .collect();
            slots.extend(ghosts.into_iter().map(Slot::Ghost));
            (Just(requests), Just(slots).prop_shuffle())
        })
}

proptest! {
    #[test]
    fn every_request_yields_one_exchange_in_send_order((requests, slots) in scenario()) {
        let mut correlator = NetworkCorrelator::new(&NetworkConfig::default());
        let now = Instant::now();

        for (i, request) in requests.iter().enumerate() {
            prop_assert_eq!(correlator.apply(sent(i, request.resource_type()), now), Ingest::Created);
        }

        let mut progress = vec![0usize; requests.len()];
        let mut awaiting_body = Vec::new();
        for slot in slots {
            match slot {
                Slot::Request(i) => {
                    let request = &requests[i];
                    let request_id = id(i);
                    let event = match (request.fails, progress[i]) {
                        (true, _) => failed(&request_id),
                        (false, 0) => responded(&request_id, request.status),
                        (false, _) => finished(&request_id),
                    };
                    progress[i] += 1;
                    if let Ingest::NeedsBody(needs) = correlator.apply(event, now) {
                        prop_assert!(request.fetched);
                        awaiting_body.push((i, needs));
                    }
                }
                Slot::Ghost(kind) => {
                    let event = match kind {
                        0 => responded("ghost", 200),
                        1 => finished("ghost"),
                        _ => failed("ghost"),
                    };
                    prop_assert_eq!(correlator.apply(event, now), Ingest::Unknown);
                    prop_assert_eq!(correlator.len(), requests.len());
                }
            }
        }

        // Bodies come back after other requests have moved on
        for (i, request_id) in awaiting_body {
            let result = if requests[i].body_available {
                Ok(Request::body(i))
            } else {
                Err(InstrumentationError::BodyFetch("No resource with given identifier found".into()))
            };
            prop_assert!(correlator.attach_body(&request_id, result));
        }

        // Late events for terminal exchanges change nothing
        for i in 0..requests.len() {
            prop_assert_eq!(correlator.apply(responded(&id(i), 999), now), Ingest::Stale);
        }
        prop_assert!(correlator.get(&RequestId::new("ghost")).is_none());

        let exchanges = correlator.drain();
        prop_assert_eq!(exchanges.len(), requests.len());
        for (i, exchange) in exchanges.iter().enumerate() {
            let request = &requests[i];
            prop_assert_eq!(&exchange.url, &url(i));
            prop_assert!(exchange.is_complete());
            prop_assert_eq!(exchange.failed, request.fails);
            if request.fails {
                prop_assert_eq!(exchange.status, None);
                prop_assert_eq!(exchange.body.as_ref(), None);
            } else if request.fetched {
                prop_assert_eq!(exchange.status, Some(request.status));
                let expected = request.body_available.then(|| Request::body(i));
                prop_assert_eq!(&exchange.body, &expected);
            } else {
                prop_assert_eq!(exchange.status, Some(request.status));
                // Image bodies are never fetched
                let placeholder = exchange
                    .body
                    .as_deref()
                    .is_some_and(|body| body.starts_with("[Response body not captured"));
                prop_assert!(placeholder);
            }
        }
        prop_assert!(correlator.is_empty());
    }
}
