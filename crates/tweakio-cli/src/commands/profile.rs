use anyhow::Result;
use clap::Subcommand;
use tracing::info;
use tweakio_profiles::{BackupPolicy, ProfileInfo, ProfileKey, ProfileStore};

use super::{Context, ProfileArgs};

#[derive(Subcommand)]
pub enum ProfileCommand {
    /// Create a new profile
    Create(ProfileArgs),

    /// Print a profile's metadata
    Show(ProfileArgs),

    /// List profiles, optionally for one platform
    List {
        #[arg(short, long)]
        platform: Option<String>,
    },

    /// Mark a profile active for this process
    Activate(ProfileArgs),

    /// Clear the active flag and remove the lock file
    Deactivate(ProfileArgs),

    /// List profiles whose metadata says they are active
    Active {
        platform: String,
    },

    /// Delete a profile directory
    Delete {
        #[command(flatten)]
        profile: ProfileArgs,
        /// Delete even if the profile is marked active
        #[arg(long)]
        force: bool,
    },

    /// Back up the session file
    Backup(ProfileArgs),

    /// List session backups, newest first
    Backups(ProfileArgs),

    /// Change the backup policy
    SetBackup {
        #[command(flatten)]
        profile: ProfileArgs,
        /// Number of backups to keep
        #[arg(long, default_value_t = 10)]
        max: u32,
        /// Turn backups off
        #[arg(long)]
        disable: bool,
    },

    /// Activate profiles for a launch and print the headless decision for each
    Launch {
        /// Profiles as platform:profile_id
        #[arg(required = true)]
        profiles: Vec<ProfileKey>,
        /// Run headless even when nothing else is active
        #[arg(long)]
        headless: bool,
    },
}

pub fn run(ctx: &Context, cmd: ProfileCommand) -> Result<()> {
    let store = &ctx.store;
    match cmd {
        ProfileCommand::Create(p) => {
            let info = store.create(&p.platform, &p.profile_id)?;
            println!("created {} at {}", info.key, info.dir.display());
        }
        ProfileCommand::Show(p) => print_info(&ctx.profile(&p)?)?,
        ProfileCommand::List { platform } => {
            for key in store.list(platform.as_deref())? {
                println!("{key}");
            }
        }
        ProfileCommand::Activate(p) => {
            let info = store.activate(&p.platform, &p.profile_id)?;
            println!(
                "{} active (pid {})",
                info.key,
                info.metadata.status.last_active_pid.unwrap_or_default()
            );
        }
        ProfileCommand::Deactivate(p) => {
            let info = store.deactivate(&p.platform, &p.profile_id)?;
            println!("{} inactive", info.key);
        }
        ProfileCommand::Active { platform } => {
            for key in store.get_active(&platform)? {
                match store.lock_owner(&key.platform, &key.profile_id)? {
                    Some(pid) => println!("{key}\tpid {pid}"),
                    None => println!("{key}\tno lock file"),
                }
            }
        }
        ProfileCommand::Delete { profile, force } => {
            store.delete(&profile.platform, &profile.profile_id, force)?;
            println!("deleted {}:{}", profile.platform.to_lowercase(), profile.profile_id);
        }
        ProfileCommand::Backup(p) => match store.backup(&p.platform, &p.profile_id)? {
            Some(path) => println!("{}", path.display()),
            None => println!("backups are disabled for {}:{}", p.platform, p.profile_id),
        },
        ProfileCommand::Backups(p) => {
            for entry in store.list_backups(&p.platform, &p.profile_id)? {
                println!(
                    "{}\t{} bytes\t{}",
                    entry.file_name,
                    entry.size_bytes,
                    entry.modified.to_rfc3339()
                );
            }
        }
        ProfileCommand::SetBackup { profile, max, disable } => {
            let policy = BackupPolicy {
                enabled: !disable,
                max_backups: max,
            };
            let info = store.set_backup_policy(&profile.platform, &profile.profile_id, policy)?;
            println!(
                "{} backups: enabled={} max={}",
                info.key, policy.enabled, policy.max_backups
            );
        }
        ProfileCommand::Launch { profiles, headless } => {
            // Guards keep each profile registered until the plan is printed.
            let mut guards = Vec::with_capacity(profiles.len());
            for key in profiles {
                let info = store.activate(&key.platform, &key.profile_id)?;
                let run_headless = ctx.registry.effective_headless(headless);
                println!("{}\theadless={run_headless}", info.key);
                guards.push(ctx.registry.guard(info.key.to_string()));
            }
            info!(active = ctx.registry.count(), "launch plan ready");
        }
    }
    Ok(())
}

fn print_info(info: &ProfileInfo) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&info.metadata)?);
    println!("directory: {}", info.dir.display());
    println!("database:  {}", info.database_file().display());
    Ok(())
}
