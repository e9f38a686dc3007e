use std::path::PathBuf;

use thiserror::Error;
use tweakio_shared::ErrorKind;

/// Errors produced by the profile store.
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Profile '{profile_id}' does not exist for platform '{platform}'")]
    NotFound { platform: String, profile_id: String },

    #[error("Profile '{profile_id}' already exists for platform '{platform}'")]
    AlreadyExists { platform: String, profile_id: String },

    /// Metadata is present but cannot be trusted.
    #[error("Corrupted metadata at {path}: {reason}")]
    Corrupted { path: PathBuf, reason: String },

    #[error("Cannot delete active profile '{profile_id}' on '{platform}'; deactivate it first or force")]
    ActiveProfile { platform: String, profile_id: String },

    /// The platform data directory could not be determined.
    #[error("Could not determine application data directory")]
    NoDataDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProfileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProfileError::InvalidInput(_) => ErrorKind::InvalidInput,
            ProfileError::NotFound { .. } => ErrorKind::NotFound,
            ProfileError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            ProfileError::Corrupted { .. } | ProfileError::Json(_) => ErrorKind::Corrupted,
            ProfileError::ActiveProfile { .. } => ErrorKind::ActiveProfile,
            ProfileError::NoDataDir | ProfileError::Io(_) => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProfileError>;
