pub mod key;
pub mod messages;
pub mod profile;

use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use clap::Args;
use tweakio_profiles::{ActiveProfileRegistry, FsProfileStore, ProfileInfo, ProfileStore};
use tweakio_shared::constants::KDF_NAME;
use tweakio_shared::{EncryptionKey, KeyDerivation};

pub use key::KeyCommand;
pub use messages::MessagesCommand;
pub use profile::ProfileCommand;

use crate::config::CliConfig;

/// State shared by every command for the lifetime of the process.
pub struct Context {
    pub config: CliConfig,
    pub store: FsProfileStore,
    pub registry: Arc<ActiveProfileRegistry>,
}

impl Context {
    pub fn new(config: CliConfig) -> Result<Self> {
        let dirs = config.directories()?;
        Ok(Self {
            store: FsProfileStore::new(&dirs),
            registry: Arc::new(ActiveProfileRegistry::new()),
            config,
        })
    }

    pub fn profile(&self, args: &ProfileArgs) -> Result<ProfileInfo> {
        Ok(self.store.get(&args.platform, &args.profile_id)?)
    }

    pub fn require_password(&self) -> Result<&str> {
        self.config
            .password
            .as_deref()
            .ok_or_else(|| anyhow!("a password is required (--password or TWEAKIO_PASSWORD)"))
    }
}

#[derive(Args, Debug, Clone)]
pub struct ProfileArgs {
    /// Platform name, e.g. whatsapp
    pub platform: String,
    /// Profile identifier within the platform
    pub profile_id: String,
}

/// Re-derive the profile's key from `password` and the salt in its metadata.
pub fn derive_profile_key(info: &ProfileInfo, password: &str) -> Result<EncryptionKey> {
    let encryption = &info.metadata.encryption;
    let salt = encryption
        .salt()
        .map_err(|e| anyhow!("profile {}: {e}", info.key))?
        .ok_or_else(|| anyhow!("profile {} has no key yet; run `tweakio key init` first", info.key))?;

    if let Some(kdf) = encryption.kdf.as_deref() {
        if kdf != KDF_NAME {
            bail!("profile {} uses unsupported KDF {kdf:?}", info.key);
        }
    }

    let kdf = KeyDerivation::new(encryption.kdf_params.unwrap_or_default());
    Ok(kdf.derive(password.as_bytes(), salt.as_bytes())?)
}
