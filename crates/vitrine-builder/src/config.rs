//! Builder configuration.

use serde::{Deserialize, Serialize};

/// Default maximum diff-chain length before a full rebuild is forced.
pub const DEFAULT_DIFF_THRESHOLD: usize = 100;

/// Default maximum pending change rows read per build.
pub const DEFAULT_QUEUE_BATCH_LIMIT: usize = 500;

/// Configuration for the snapshot builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Maximum diffs allowed before a full rebuild is forced.
    ///
    /// Exceeding this means the diff chain would make client-side
    /// reconstruction more expensive than a fresh full fetch, so the protocol
    /// amortizes cost by collapsing history.
    pub diff_threshold: usize,

    /// Maximum pending change rows read per build.
    pub queue_batch_limit: usize,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            diff_threshold: DEFAULT_DIFF_THRESHOLD,
            queue_batch_limit: DEFAULT_QUEUE_BATCH_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: BuilderConfig = serde_json::from_str("{}").expect("parse");
        assert_eq!(config.diff_threshold, DEFAULT_DIFF_THRESHOLD);
        assert_eq!(config.queue_batch_limit, DEFAULT_QUEUE_BATCH_LIMIT);

        let config: BuilderConfig =
            serde_json::from_str(r#"{"diff_threshold": 7}"#).expect("parse");
        assert_eq!(config.diff_threshold, 7);
        assert_eq!(config.queue_batch_limit, DEFAULT_QUEUE_BATCH_LIMIT);
    }
}
