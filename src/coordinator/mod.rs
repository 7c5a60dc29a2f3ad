//! Session coordinator context

pub mod bundle;
mod lifecycle;
pub mod error;
mod router;

pub(crate) use bundle::LogBuffer;
pub use bundle::{SessionBundle, SessionLogs};
pub use lifecycle::{CaptureOwner, Coordinator, CoordinatorDeps};
pub use error::SessionError;
