//! Error types for economy storage.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
///
/// A lost version race is *not* an error — conditional writes report it
/// through [`crate::CasOutcome`] so callers treat retryability as data.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("not found")]
    NotFound,
}

impl From<StoreError> for guild_economy_core::EconomyError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound("storage record".to_string()),
            other => Self::Storage(other.to_string()),
        }
    }
}
