use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Subcommand;
use tweakio_profiles::EncryptionSettings;
use tweakio_shared::{EncryptionKey, KdfParams, KeyDerivation};

use super::{derive_profile_key, Context, ProfileArgs};

#[derive(Subcommand)]
pub enum KeyCommand {
    /// Generate a salt for the profile and print the derived key's fingerprint
    Init {
        #[command(flatten)]
        profile: ProfileArgs,
        /// Replace an existing salt; messages encrypted under the old key
        /// become unreadable
        #[arg(long)]
        force: bool,
    },

    /// Write the derived key to a file only the owner can read
    Export {
        #[command(flatten)]
        profile: ProfileArgs,
        #[arg(long)]
        out: PathBuf,
    },

    /// Check the password against an exported key file
    Verify {
        #[command(flatten)]
        profile: ProfileArgs,
        #[arg(long)]
        key_file: PathBuf,
    },
}

pub fn run(ctx: &Context, cmd: KeyCommand) -> Result<()> {
    match cmd {
        KeyCommand::Init { profile, force } => {
            let info = ctx.profile(&profile)?;
            if info.metadata.encryption.is_configured() && !force {
                bail!("{} already has a key; pass --force to replace it", info.key);
            }
            let password = ctx.require_password()?;

            let params = KdfParams::default();
            let (salt, key) = KeyDerivation::new(params).derive_and_generate_salt(password.as_bytes())?;
            let info = ctx.store.set_encryption(
                &profile.platform,
                &profile.profile_id,
                EncryptionSettings::argon2id(&salt, params),
            )?;
            println!("{} key fingerprint {}", info.key, key.fingerprint());
        }
        KeyCommand::Export { profile, out } => {
            let info = ctx.profile(&profile)?;
            let key = derive_profile_key(&info, ctx.require_password()?)?;
            key.save_to_file(&out)?;
            println!("wrote key {} to {}", key.fingerprint(), out.display());
        }
        KeyCommand::Verify { profile, key_file } => {
            let info = ctx.profile(&profile)?;
            let expected: EncryptionKey = EncryptionKey::load_from_file(&key_file)?;
            let Some(salt) = info.metadata.encryption.salt().map_err(anyhow::Error::msg)? else {
                bail!("{} has no key yet", info.key);
            };
            let kdf = KeyDerivation::new(info.metadata.encryption.kdf_params.unwrap_or_default());
            let password = ctx.require_password()?;

            if kdf.verify(password.as_bytes(), salt.as_bytes(), expected.as_bytes()) {
                println!("password matches key {}", expected.fingerprint());
            } else {
                bail!("password does not match {}", key_file.display());
            }
        }
    }
    Ok(())
}
