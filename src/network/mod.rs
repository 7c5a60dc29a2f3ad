//! Network exchange correlation

pub mod correlator;
pub mod events;
pub mod exchange;

pub use correlator::{BodyFetcher, Ingest, NetworkCorrelator};
pub use events::{
    Headers, LoadingFailed, LoadingFinished, NetworkEvent, PageNetworkLog, RequestId,
    RequestPayload, RequestWillBeSent, ResourceType, ResponsePayload, ResponseReceived,
};
pub use exchange::{ExchangeStage, NetworkExchange};
