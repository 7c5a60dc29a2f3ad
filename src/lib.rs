pub mod capture;
pub mod config;
pub mod console;
pub mod coordinator;
pub mod host;
pub mod instrumentation;
pub mod network;
pub mod page;
pub mod protocol;
pub mod session;
pub mod util;

pub use capture::{CapturedVideo, MediaCaptureWorker, VideoBlob};
pub use config::{CaptureTopology, Config};
pub use coordinator::{Coordinator, CoordinatorDeps, SessionBundle, SessionError, SessionLogs};
pub use network::{NetworkCorrelator, NetworkExchange};
pub use page::{ActionEvent, ActionRecorder, TabObserver};
pub use protocol::{CaptureMode, Envelope, Request, Response, TabId};
pub use session::{FileStateStore, PersistedSession, Session, StateStore};
