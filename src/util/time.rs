//! Wall-clock access.
//!
//! Durations inside a context use `tokio::time::Instant`; epoch timestamps that
//! end up in the bundle go through a [`Clock`] so tests can pin them.

use std::time::{SystemTime, UNIX_EPOCH};

/// Source of epoch-millisecond timestamps shared by all contexts.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Clock backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        now_ms()
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Truncate to at most `max` characters (not bytes).
pub fn truncate_chars(input: &str, max: usize) -> String {
    match input.char_indices().nth(max) {
        Some((idx, _)) => input[..idx].to_string(),
        None => input.to_string(),
    }
}
