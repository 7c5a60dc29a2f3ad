//! Integration tests for bugreel
//!
//! These tests run the coordinator, tab observers and the capture worker as
//! real tasks talking over mailboxes.

#[path = "../common/mod.rs"]
pub mod common;

pub mod cli;
pub mod correlator_props;
pub mod cross_tab;
pub mod recovery;
pub mod session_flow;
