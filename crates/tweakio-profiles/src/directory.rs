//! Where the application keeps its files.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::error::{ProfileError, Result};

/// Root directories for one application.
pub trait DirectoryResolver: Send + Sync {
    fn data_dir(&self) -> &Path;
    fn cache_dir(&self) -> &Path;
    fn log_dir(&self) -> &Path;

    /// Parent of every `<platform>/<profile_id>` directory.
    fn platforms_dir(&self) -> PathBuf {
        self.data_dir().join("platforms")
    }
}

/// Directory roots resolved once, either from the OS conventions or from an
/// explicit root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDirectories {
    data: PathBuf,
    cache: PathBuf,
    log: PathBuf,
}

impl AppDirectories {
    /// Resolve the platform-appropriate directories for `app_name`:
    /// - Linux:   `~/.local/share/<app>`
    /// - macOS:   `~/Library/Application Support/<app>`
    /// - Windows: `{FOLDERID_RoamingAppData}\<app>\data`
    pub fn new(app_name: &str) -> Result<Self> {
        if app_name.trim().is_empty() {
            return Err(ProfileError::InvalidInput("application name is empty".into()));
        }
        let dirs = ProjectDirs::from("", "", app_name).ok_or(ProfileError::NoDataDir)?;

        Ok(Self {
            data: dirs.data_dir().to_path_buf(),
            cache: dirs.cache_dir().to_path_buf(),
            log: dirs.data_local_dir().join("logs"),
        })
    }

    /// Keep everything under one explicit root.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            cache: root.join("cache"),
            log: root.join("logs"),
            data: root,
        }
    }
}

impl DirectoryResolver for AppDirectories {
    fn data_dir(&self) -> &Path {
        &self.data
    }

    fn cache_dir(&self) -> &Path {
        &self.cache
    }

    fn log_dir(&self) -> &Path {
        &self.log
    }
}
