//! Cross-context message protocol

pub mod mailbox;
pub mod messages;

pub use mailbox::{mailbox, ChannelError, ContextLink, Inbox, Incoming, Mailbox, Responder};
pub use messages::{
    CaptureMode, ContextKind, Envelope, ErrorCode, ProtocolError, RecordingStatus, Request,
    Response, Sender, TabCommand, TabId, WorkerCommand, WorkerReply,
};
