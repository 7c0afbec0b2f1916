//! Error types and result aliases shared across Vitrine components.
//!
//! Errors are structured for programmatic handling and include context for
//! debugging. Component crates define their own error enums and convert from
//! these where a storage-level failure propagates upward.

use std::fmt;

/// The result type used throughout Vitrine.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Vitrine storage and protocol operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A blob store operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A serialization or deserialization error occurred.
    ///
    /// On the client side this is how a corrupt fetched artifact surfaces.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// The requested object was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A network operation exceeded its deadline.
    ///
    /// Treated identically to a network error by both sides of the protocol.
    #[error("timeout: {message}")]
    Timeout {
        /// Description of the operation that timed out.
        message: String,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a new storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source cause.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new serialization error.
    #[must_use]
    pub fn serialization(message: impl fmt::Display) -> Self {
        Self::Serialization {
            message: message.to_string(),
        }
    }

    /// Creates a new timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Returns true when the error indicates a missing object rather than a
    /// failed operation.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
