//! Recording session state and its persistence

pub mod state;
pub mod store;

pub use state::{PersistedSession, Session, SessionPhase};
pub use store::{FileStateStore, MemoryStateStore, StateStore, StoreError};
