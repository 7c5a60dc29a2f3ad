//! Capabilities the browser host provides to the coordinator.
//!
//! Everything here is an external collaborator reached across a context
//! boundary: tab messaging and script injection, the capture worker's host
//! document, screenshots and the final bundle consumer.

pub mod local;
pub mod mock;

use async_trait::async_trait;
use thiserror::Error;

use crate::coordinator::SessionBundle;
use crate::protocol::{ChannelError, TabCommand, TabId, WorkerCommand, WorkerReply};

pub use local::{LocalCaptureHost, LocalPageHost, ObserverInjector};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("Tab {0} has no observer")]
    NoObserver(TabId),
    #[error("Context channel failed: {0}")]
    Channel(#[from] ChannelError),
    #[error("{command} rejected: {message}")]
    Rejected {
        command: &'static str,
        message: String,
    },
    #[error("Script injection failed: {0}")]
    Injection(String),
    #[error("Capture worker unavailable: {0}")]
    Worker(String),
    #[error("Host capability unavailable: {0}")]
    Unsupported(&'static str),
}

/// Tab-facing host capabilities
#[async_trait]
pub trait PageHost: Send + Sync {
    /// Deliver a command to the tab's observer and wait for its ack
    async fn send(&self, tab: TabId, command: TabCommand) -> Result<(), HostError>;

    /// Inject the observer (action recorder + capture prompt) into the tab
    async fn inject_observer(&self, tab: TabId) -> Result<(), HostError>;

    /// Screenshot of the visible part of the tab, as a data URL
    async fn capture_visible_frame(&self, tab: TabId) -> Result<String, HostError>;

    /// Read environment globals from the page
    async fn execute_page_probe(&self, tab: TabId) -> Result<serde_json::Value, HostError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPurpose {
    TabCapture,
    /// Display capture needs a worker created for the picker, so any existing
    /// one is replaced
    DisplayCapture,
}

/// Host side of the media capture worker
#[async_trait]
pub trait CaptureHost: Send + Sync {
    async fn ensure_worker(&self, purpose: WorkerPurpose) -> Result<(), HostError>;

    /// Host-issued stream id granting tab capture to the worker
    async fn tab_stream_id(&self, tab: TabId) -> Result<String, HostError>;

    async fn send(&self, command: WorkerCommand) -> Result<WorkerReply, HostError>;

    /// Tear down the worker's host document. Succeeds when none exists.
    async fn close_worker(&self) -> Result<(), HostError>;

    fn has_worker(&self) -> bool;
}

/// Receives a bundle emitted by the context that owned the capture stream
#[async_trait]
pub trait BundleConsumer: Send + Sync {
    async fn consume(&self, bundle: SessionBundle) -> Result<(), HostError>;
}
