//! Media capture worker: owns the capture stream and its encoder.

use std::sync::Arc;

use tokio::task::JoinHandle;

use super::media::{select_format, CaptureError, MediaBackend, MediaEncoder, RecorderState, StreamDescriptor};
use super::video::{CapturedVideo, StopOutcome, VideoBlob};
use crate::config::CaptureConfig;
use crate::protocol::{mailbox, Inbox, Mailbox, WorkerCommand, WorkerReply};

const WORKER_MAILBOX_CAPACITY: usize = 8;

pub struct MediaCaptureWorker {
    backend: Arc<dyn MediaBackend>,
    config: CaptureConfig,
    encoder: Option<Box<dyn MediaEncoder>>,
    chunks: Vec<Vec<u8>>,
}

impl MediaCaptureWorker {
    pub fn new(backend: Arc<dyn MediaBackend>, config: CaptureConfig) -> Self {
        Self {
            backend,
            config,
            encoder: None,
            chunks: Vec::new(),
        }
    }

    /// Encoder state, `None` when no stream is open
    pub fn state(&self) -> Option<RecorderState> {
        self.encoder.as_ref().map(|encoder| encoder.state())
    }

    pub fn is_capturing(&self) -> bool {
        self.state() == Some(RecorderState::Recording)
    }

    /// Open the stream and start encoding. Returns the chosen format.
    pub async fn start(&mut self, descriptor: StreamDescriptor) -> Result<String, CaptureError> {
        if self.is_capturing() {
            return Err(CaptureError::AlreadyCapturing);
        }
        if let Some(mut stale) = self.encoder.take() {
            tracing::debug!("releasing stale encoder before restart");
            stale.release_tracks();
        }
        self.chunks.clear();

        let backend = Arc::clone(&self.backend);
        let mime_type = select_format(
            &self.config.format_candidates,
            &self.config.fallback_format,
            |candidate| backend.is_type_supported(candidate),
        );

        let mut encoder = self.backend.open(&descriptor, &mime_type).await?;
        if let Err(err) = encoder.start() {
            encoder.release_tracks();
            return Err(err);
        }
        tracing::info!(mime_type = %mime_type, "capture started");
        self.encoder = Some(encoder);
        Ok(mime_type)
    }

    /// Stop and flush. Tracks are released exactly once on every path that
    /// had a stream.
    pub async fn stop(&mut self) -> CapturedVideo {
        let Some(mut encoder) = self.encoder.take() else {
            return CapturedVideo::empty(StopOutcome::NoStream);
        };
        let mime_type = encoder.mime_type().to_string();
        self.chunks.extend(encoder.take_chunks());

        let outcome = match encoder.state() {
            RecorderState::Recording => match encoder.stop().await {
                Ok(()) => {
                    self.chunks.extend(encoder.take_chunks());
                    StopOutcome::Finalized
                }
                Err(err) => {
                    tracing::warn!(error = %err, "graceful stop failed, salvaging buffered data");
                    self.chunks.extend(encoder.take_chunks());
                    self.salvage_outcome()
                }
            },
            state => {
                tracing::debug!(?state, buffered = self.chunks.len(), "stop on non-recording encoder");
                self.salvage_outcome()
            }
        };
        encoder.release_tracks();
        drop(encoder);

        let data: Vec<u8> = self.chunks.drain(..).flatten().collect();
        let video = (!data.is_empty()).then(|| VideoBlob::new(mime_type, data));
        CapturedVideo { outcome, video }
    }

    fn salvage_outcome(&self) -> StopOutcome {
        if self.chunks.iter().any(|chunk| !chunk.is_empty()) {
            StopOutcome::Salvaged
        } else {
            StopOutcome::Idle
        }
    }

    /// Run this worker as its own context, serving commands one at a time.
    pub fn spawn(self) -> (Mailbox<WorkerCommand, WorkerReply>, JoinHandle<()>) {
        let (mailbox, inbox) = mailbox(WORKER_MAILBOX_CAPACITY);
        let handle = tokio::spawn(serve(self, inbox));
        (mailbox, handle)
    }
}

impl Drop for MediaCaptureWorker {
    fn drop(&mut self) {
        if let Some(mut encoder) = self.encoder.take() {
            encoder.release_tracks();
        }
    }
}

async fn serve(mut worker: MediaCaptureWorker, mut inbox: Inbox<WorkerCommand, WorkerReply>) {
    while let Some(incoming) = inbox.recv().await {
        let (command, responder) = incoming.into_parts();
        let reply = match command {
            WorkerCommand::Start { descriptor } => match worker.start(descriptor).await {
                Ok(mime_type) => WorkerReply::Started { mime_type },
                Err(err) => WorkerReply::Failed {
                    message: err.to_string(),
                },
            },
            WorkerCommand::Stop => WorkerReply::Stopped {
                captured: worker.stop().await,
            },
        };
        if !responder.respond(reply) {
            tracing::debug!("worker reply dropped, requester went away");
        }
    }
    tracing::debug!("capture worker inbox closed");
}
