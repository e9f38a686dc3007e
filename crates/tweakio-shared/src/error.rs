use std::fmt;

use thiserror::Error;

/// Failure categories shared by every tweakio crate.
///
/// Each crate keeps its own error enum; `kind()` maps it onto this taxonomy
/// so callers can branch without knowing which crate produced the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    InvalidKey,
    AuthenticationFailed,
    NotFound,
    AlreadyExists,
    Corrupted,
    ActiveProfile,
    StorageUnavailable,
    AlreadyClosed,
    WriteFailure,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::InvalidKey => "invalid key",
            ErrorKind::AuthenticationFailed => "authentication failed",
            ErrorKind::NotFound => "not found",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::Corrupted => "corrupted",
            ErrorKind::ActiveProfile => "profile is active",
            ErrorKind::StorageUnavailable => "storage unavailable",
            ErrorKind::AlreadyClosed => "already closed",
            ErrorKind::WriteFailure => "write failure",
            ErrorKind::Io => "i/o error",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Decryption failed: authentication tag mismatch")]
    AuthenticationFailed,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Key file error: {0}")]
    KeyFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl CryptoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CryptoError::InvalidInput(_)
            | CryptoError::EncryptionFailed
            | CryptoError::KeyDerivation(_)
            | CryptoError::Base64(_) => ErrorKind::InvalidInput,
            CryptoError::InvalidKeyLength { .. } | CryptoError::KeyFile(_) => ErrorKind::InvalidKey,
            CryptoError::AuthenticationFailed => ErrorKind::AuthenticationFailed,
            CryptoError::Io(_) => ErrorKind::Io,
        }
    }
}

/// A producer handed over a message that cannot be stored.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MessageError {
    #[error("message_id must not be empty")]
    EmptyId,

    #[error("system_hit_time must be a finite, non-negative number of seconds (got {0})")]
    InvalidHitTime(f64),
}

impl MessageError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidInput
    }
}
