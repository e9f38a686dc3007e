//! CLI configuration loaded from environment variables.
//!
//! Command-line flags, where given, take precedence over these.

use std::fmt;
use std::path::PathBuf;

use tweakio_profiles::{AppDirectories, ProfileError};
use tweakio_shared::constants::APP_NAME;

#[derive(Clone)]
pub struct CliConfig {
    /// Application name used to resolve OS data directories.
    /// Env: `TWEAKIO_APP_NAME`
    /// Default: `tweakio`
    pub app_name: String,

    /// Explicit data root; skips OS directory resolution.
    /// Env: `TWEAKIO_DATA_DIR`
    pub data_dir: Option<PathBuf>,

    /// Password for key derivation.
    /// Env: `TWEAKIO_PASSWORD`
    pub password: Option<String>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            data_dir: None,
            password: None,
        }
    }
}

impl CliConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(name) = lookup("TWEAKIO_APP_NAME") {
            if name.trim().is_empty() {
                tracing::warn!("empty TWEAKIO_APP_NAME, using default");
            } else {
                config.app_name = name;
            }
        }
        if let Some(dir) = lookup("TWEAKIO_DATA_DIR").filter(|d| !d.is_empty()) {
            config.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(password) = lookup("TWEAKIO_PASSWORD").filter(|p| !p.is_empty()) {
            config.password = Some(password);
        }

        config
    }

    pub fn with_overrides(mut self, data_dir: Option<PathBuf>, password: Option<String>) -> Self {
        if data_dir.is_some() {
            self.data_dir = data_dir;
        }
        if password.is_some() {
            self.password = password;
        }
        self
    }

    pub fn directories(&self) -> Result<AppDirectories, ProfileError> {
        match &self.data_dir {
            Some(root) => Ok(AppDirectories::at(root)),
            None => AppDirectories::new(&self.app_name),
        }
    }
}

impl fmt::Debug for CliConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CliConfig")
            .field("app_name", &self.app_name)
            .field("data_dir", &self.data_dir)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::Path;

    use tweakio_profiles::DirectoryResolver;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = CliConfig::from_lookup(lookup(&[]));
        assert_eq!(config.app_name, "tweakio");
        assert!(config.data_dir.is_none());
        assert!(config.password.is_none());
    }

    #[test]
    fn test_env_and_flag_precedence() {
        let config = CliConfig::from_lookup(lookup(&[
            ("TWEAKIO_DATA_DIR", "/srv/tweakio"),
            ("TWEAKIO_PASSWORD", "from-env"),
        ]))
        .with_overrides(None, Some("from-flag".into()));

        assert_eq!(config.password.as_deref(), Some("from-flag"));
        let dirs = config.directories().unwrap();
        assert_eq!(dirs.data_dir(), Path::new("/srv/tweakio"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = CliConfig::default().with_overrides(None, Some("hunter2".into()));
        let shown = format!("{config:?}");
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("<redacted>"));
    }
}
