//! Error types for the collaborator contracts.
//!
//! Collaborator failures are expected failure modes: they are returned as
//! values and classified upstream (persistence failures map to the
//! persistence-failure fault kind, cache failures to cache corruption).

/// Errors that can occur in a persistence or cache collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The persistence backend failed.
    #[error("persistence error: {message}")]
    Persistence {
        /// Description of the failure.
        message: String,
    },

    /// The cache backend failed or returned damaged data.
    #[error("cache error: {message}")]
    Cache {
        /// Description of the failure.
        message: String,
    },

    /// A document could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
