//! Captured console output

use serde::{Deserialize, Serialize};

/// One console line captured from the observed page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleEntry {
    pub level: String,
    pub text: String,
    /// Epoch milliseconds
    pub timestamp: u64,
}

impl ConsoleEntry {
    pub fn new(level: impl Into<String>, text: impl Into<String>, timestamp: u64) -> Self {
        Self {
            level: level.into(),
            text: text.into(),
            timestamp,
        }
    }
}

/// Drops the product's own diagnostic lines so they never end up in a bundle
#[derive(Debug, Clone)]
pub struct SelfLogFilter {
    prefix: String,
}

impl SelfLogFilter {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn accepts(&self, text: &str) -> bool {
        self.prefix.is_empty() || !text.starts_with(&self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_drops_only_prefixed_lines() {
        let filter = SelfLogFilter::new("[BUGREEL");
        assert!(!filter.accepts("[BUGREEL BACKGROUND] message received"));
        assert!(filter.accepts("user log mentioning [BUGREEL later"));
        assert!(filter.accepts("TypeError: x is undefined"));
    }
}
