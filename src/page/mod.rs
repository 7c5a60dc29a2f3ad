//! Page-side contexts: the action recorder and the per-tab observer

pub mod action;
pub mod element;
pub mod observer;
pub mod recorder;

pub use action::{ActionEvent, ActionKind, ElementDescriptor};
pub use element::{ElementKey, ElementSnapshot};
pub use observer::{PageCapture, TabObserver};
pub use recorder::{ActionRecorder, DomEvent, PageContext, RecorderLink};
