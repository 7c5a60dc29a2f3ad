//! Media capture worker and the encoded video it produces

pub mod media;
pub mod video;
pub mod worker;

pub use media::{
    select_format, CaptureError, MediaBackend, MediaEncoder, RecorderState, StreamDescriptor,
};
pub use video::{CapturedVideo, StopOutcome, VideoBlob};
pub use worker::MediaCaptureWorker;
