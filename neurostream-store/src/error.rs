use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid context payload: {0}")]
    InvalidContext(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors from the optional remote replica. Replication failures are
/// reported but never abort the local write path.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Remote store unavailable")]
    Unavailable,

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("Remote rejected document: {0}")]
    Rejected(String),
}
