//! Error types for synchronizer cycles.
//!
//! These abort only the current cycle: the last known-good cached state is
//! left untouched, the error is logged, and the next interval retries.
//! End users never see them; the worst case is a catalog a few poll
//! intervals stale.

use thiserror::Error;

/// Result type alias for synchronizer operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can abort a sync cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A remote fetch exceeded its deadline; treated identically to a
    /// network error.
    #[error("network timeout: {message}")]
    NetworkTimeout {
        /// Description of the fetch that timed out.
        message: String,
    },

    /// A fetched artifact failed to parse.
    #[error("corrupt artifact: {message}")]
    CorruptArtifact {
        /// Description of the parse failure.
        message: String,
    },

    /// The remote blob store could not be reached or read.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
    },

    /// The durable local cache could not be read or written.
    #[error("cache error: {message}")]
    Cache {
        /// Description of the cache failure.
        message: String,
    },
}

impl From<vitrine_core::Error> for SyncError {
    fn from(err: vitrine_core::Error) -> Self {
        match err {
            vitrine_core::Error::Timeout { message } => Self::NetworkTimeout { message },
            vitrine_core::Error::Serialization { message } => Self::CorruptArtifact { message },
            other => Self::Storage {
                message: other.to_string(),
            },
        }
    }
}

impl SyncError {
    /// Returns the metric label for this error kind.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::NetworkTimeout { .. } => "timeout",
            Self::CorruptArtifact { .. } => "corrupt_artifact",
            Self::Storage { .. } => "storage",
            Self::Cache { .. } => "cache",
        }
    }
}
