//! Host media capabilities: opening capture streams and encoding them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Capture already in progress")]
    AlreadyCapturing,
    #[error("User cancelled the capture picker")]
    Cancelled,
    #[error("Failed to acquire capture stream: {0}")]
    StreamUnavailable(String),
    #[error("Encoder failed: {0}")]
    Encoder(String),
}

/// Handle to the stream a worker should record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StreamDescriptor {
    /// Tab capture through a host-issued stream id
    Tab {
        #[serde(rename = "streamId")]
        stream_id: String,
    },
    /// Screen or window chosen through the gesture-gated picker
    Display,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    Inactive,
    Recording,
    Paused,
}

/// An encoder bound to one open stream
#[async_trait]
pub trait MediaEncoder: Send {
    fn mime_type(&self) -> &str;

    fn state(&self) -> RecorderState;

    fn start(&mut self) -> Result<(), CaptureError>;

    /// Encoded chunks produced since the last call
    fn take_chunks(&mut self) -> Vec<Vec<u8>>;

    /// Ask the encoder to stop and wait until it has delivered its last chunk
    async fn stop(&mut self) -> Result<(), CaptureError>;

    /// Release the underlying tab/display/camera tracks
    fn release_tracks(&mut self);
}

#[async_trait]
pub trait MediaBackend: Send + Sync {
    fn is_type_supported(&self, mime_type: &str) -> bool;

    /// Open a stream and wrap it in an encoder. For [`StreamDescriptor::Display`]
    /// this blocks until the user answers the picker.
    async fn open(
        &self,
        descriptor: &StreamDescriptor,
        mime_type: &str,
    ) -> Result<Box<dyn MediaEncoder>, CaptureError>;
}

/// First supported candidate, else the fallback. Never fails.
pub fn select_format(
    candidates: &[String],
    fallback: &str,
    is_supported: impl Fn(&str) -> bool,
) -> String {
    candidates
        .iter()
        .find(|candidate| is_supported(candidate))
        .cloned()
        .unwrap_or_else(|| fallback.to_string())
}
