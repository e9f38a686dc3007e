use thiserror::Error;
use tweakio_shared::{CryptoError, ErrorKind, MessageError};

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// A producer handed over a message that cannot be stored.
    #[error("Invalid message: {0}")]
    InvalidMessage(#[from] MessageError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// The engine has not been started, or has been shut down.
    #[error("Storage unavailable: {0}")]
    Unavailable(&'static str),

    #[error("Storage engine already closed")]
    AlreadyClosed,

    /// A batch could not be written and was not retried further.
    #[error("Batch write failed: {0}")]
    WriteFailure(String),

    /// A blocking database task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Chrono parsing error.
    #[error("Timestamp parse error: {0}")]
    ChronoParse(#[from] chrono::ParseError),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Sqlite(_) | StoreError::Io(_) => ErrorKind::Io,
            StoreError::Migration(_) | StoreError::ChronoParse(_) => ErrorKind::Corrupted,
            StoreError::InvalidMessage(e) => e.kind(),
            StoreError::Crypto(e) => e.kind(),
            StoreError::Unavailable(_) | StoreError::Task(_) => ErrorKind::StorageUnavailable,
            StoreError::AlreadyClosed => ErrorKind::AlreadyClosed,
            StoreError::WriteFailure(_) => ErrorKind::WriteFailure,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
