//! Error types for snapshot builds.

use thiserror::Error;

/// Result type alias for builder operations.
pub type Result<T> = std::result::Result<T, BuildError>;

/// Errors that can occur during a snapshot build.
///
/// Any of these aborts the entire build with no partial queue acknowledgment
/// and no manifest write; the next scheduled invocation retries from scratch.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A blob store operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
    },

    /// The change queue could not be read or acknowledged.
    #[error("change queue error: {message}")]
    QueueUnavailable {
        /// Description of the queue failure.
        message: String,
    },

    /// The authoritative catalog could not be read.
    #[error("catalog read error: {message}")]
    CatalogRead {
        /// Description of the read failure.
        message: String,
    },

    /// Serialization of an artifact or manifest failed.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// A concurrent builder published the manifest first, and the retry also
    /// lost the race.
    #[error("manifest conflict: {message}")]
    ManifestConflict {
        /// Description of the conflict.
        message: String,
    },
}

impl From<vitrine_core::Error> for BuildError {
    fn from(err: vitrine_core::Error) -> Self {
        match err {
            vitrine_core::Error::Serialization { message } => Self::Serialization { message },
            other => Self::Storage {
                message: other.to_string(),
            },
        }
    }
}
