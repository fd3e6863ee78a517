use thiserror::Error;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("short code not found: {0}")]
    NotFound(String),
    #[error("short code was deleted: {0}")]
    Gone(String),
    #[error("record already exists: {0}")]
    DuplicateKey(String),
    #[error("short code {code} already maps to a different url")]
    Collision { code: String, url: String },
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("failed to persist storage: {0}")]
    Persistence(String),
    #[error("storage operation failed: {0}")]
    Operation(String),
}
