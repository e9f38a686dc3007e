//! Filesystem-backed profile store.

use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::backup::{self, BackupEntry};
use crate::directory::DirectoryResolver;
use crate::error::{ProfileError, Result};
use crate::layout::{self, ProfileLayout};
use crate::metadata::{write_atomic, BackupPolicy, EncryptionSettings, ProfileMetadata};
use crate::profile::{ProfileInfo, ProfileKey};

/// Profile lifecycle keyed by `(platform, profile_id)`.
pub trait ProfileStore: Send + Sync {
    /// Lay down a new profile. Fails with `AlreadyExists` if its directory is
    /// already there.
    fn create(&self, platform: &str, profile_id: &str) -> Result<ProfileInfo>;

    fn get(&self, platform: &str, profile_id: &str) -> Result<ProfileInfo>;

    /// Profiles of one platform, or of every platform when `None`.
    fn list(&self, platform: Option<&str>) -> Result<Vec<ProfileKey>>;

    /// Mark the profile active for this process. No-op if already active.
    fn activate(&self, platform: &str, profile_id: &str) -> Result<ProfileInfo>;

    fn deactivate(&self, platform: &str, profile_id: &str) -> Result<ProfileInfo>;

    /// Profiles whose metadata says they are active, whichever process set it.
    fn get_active(&self, platform: &str) -> Result<Vec<ProfileKey>>;

    fn delete(&self, platform: &str, profile_id: &str, force: bool) -> Result<()>;

    /// Back up the session file. `None` when backups are disabled.
    fn backup(&self, platform: &str, profile_id: &str) -> Result<Option<PathBuf>>;
}

/// [`ProfileStore`] over `<platforms_dir>/<platform>/<profile_id>` directories.
#[derive(Debug, Clone)]
pub struct FsProfileStore {
    platforms_root: PathBuf,
}

impl FsProfileStore {
    pub fn new(dirs: &dyn DirectoryResolver) -> Self {
        Self::at(dirs.platforms_dir())
    }

    pub fn at(platforms_root: impl Into<PathBuf>) -> Self {
        Self {
            platforms_root: platforms_root.into(),
        }
    }

    pub fn platforms_root(&self) -> &Path {
        &self.platforms_root
    }

    pub fn layout(&self, platform: &str, profile_id: &str) -> Result<ProfileLayout> {
        ProfileLayout::resolve(&self.platforms_root, platform, profile_id)
    }

    fn load(&self, platform: &str, profile_id: &str) -> Result<(ProfileLayout, ProfileMetadata)> {
        let layout = self.layout(platform, profile_id)?;
        let metadata = ProfileMetadata::load(&layout)?;
        Ok((layout, metadata))
    }

    /// Newest first.
    pub fn list_backups(&self, platform: &str, profile_id: &str) -> Result<Vec<BackupEntry>> {
        let info = self.get(platform, profile_id)?;
        Ok(backup::list(&info.backup_dir())?)
    }

    /// Replace the backup policy and prune right away if the new limit is lower.
    pub fn set_backup_policy(
        &self,
        platform: &str,
        profile_id: &str,
        policy: BackupPolicy,
    ) -> Result<ProfileInfo> {
        if policy.enabled && policy.max_backups == 0 {
            return Err(ProfileError::InvalidInput(
                "max_backups must be at least 1 when backups are enabled".into(),
            ));
        }
        let (layout, mut metadata) = self.load(platform, profile_id)?;
        metadata.backup = policy;
        metadata.save(&layout)?;

        let info = ProfileInfo::new(&layout, metadata);
        if policy.enabled {
            backup::prune(&info.backup_dir(), policy.max_backups as usize)?;
        }
        Ok(info)
    }

    pub fn set_encryption(
        &self,
        platform: &str,
        profile_id: &str,
        encryption: EncryptionSettings,
    ) -> Result<ProfileInfo> {
        let (layout, mut metadata) = self.load(platform, profile_id)?;
        metadata.encryption = encryption;
        metadata.save(&layout)?;
        info!(profile = %layout.dir().display(), "encryption settings updated");
        Ok(ProfileInfo::new(&layout, metadata))
    }

    /// Process id recorded in the profile's lock file, if there is one.
    ///
    /// The pid is not checked for liveness.
    pub fn lock_owner(&self, platform: &str, profile_id: &str) -> Result<Option<u32>> {
        let info = self.get(platform, profile_id)?;
        let path = info.lock_file();
        match fs::read_to_string(&path) {
            Ok(raw) => match raw.trim().parse::<u32>() {
                Ok(pid) => Ok(Some(pid)),
                Err(_) => {
                    warn!(path = %path.display(), "lock file does not hold a pid");
                    Ok(None)
                }
            },
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn scan_platform(&self, platform_dir: &Path, platform: &str) -> Result<Vec<ProfileKey>> {
        let read_dir = match fs::read_dir(platform_dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if !entry.path().join(layout::METADATA_FILE).is_file() {
                continue;
            }
            keys.push(ProfileKey::new(
                platform,
                entry.file_name().to_string_lossy().into_owned(),
            ));
        }
        Ok(keys)
    }
}

impl FsProfileStore {
    /// Claim the profile directory, then fill it with `populate`. If filling
    /// fails the directory is removed again, so a profile either exists whole
    /// or not at all.
    fn create_with<F>(
        &self,
        platform: &str,
        profile_id: &str,
        populate: F,
    ) -> Result<ProfileInfo>
    where
        F: FnOnce(&ProfileLayout) -> Result<ProfileMetadata>,
    {
        let layout = self.layout(platform, profile_id)?;

        fs::create_dir_all(layout.platform_dir())?;
        // Non-recursive create is the exclusivity check: of two racing
        // creators exactly one gets past this line.
        match fs::create_dir(layout.dir()) {
            Ok(()) => {}
            Err(e) if e.kind() == IoErrorKind::AlreadyExists => {
                return Err(ProfileError::AlreadyExists {
                    platform: layout.platform().to_string(),
                    profile_id: layout.profile_id().to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        }

        let metadata = match populate(&layout) {
            Ok(metadata) => metadata,
            Err(e) => {
                if let Err(cleanup) = fs::remove_dir_all(layout.dir()) {
                    warn!(
                        profile = %layout.dir().display(),
                        error = %cleanup,
                        "could not remove partially created profile"
                    );
                }
                return Err(e);
            }
        };

        info!(
            platform = layout.platform(),
            profile_id = layout.profile_id(),
            "profile created"
        );
        Ok(ProfileInfo::new(&layout, metadata))
    }
}

fn lay_out(layout: &ProfileLayout) -> Result<ProfileMetadata> {
    for dir in layout.skeleton_dirs() {
        fs::create_dir_all(dir)?;
    }
    fs::write(layout.session_file(), "{}")?;
    fs::write(layout.dir().join(layout::COOKIES_FILE), "{}")?;
    fs::write(layout.dir().join(layout::FINGERPRINT_FILE), b"")?;

    // Metadata goes last: a profile is only enumerable once complete.
    let metadata = ProfileMetadata::new(layout);
    metadata.save(layout)?;
    Ok(metadata)
}

impl ProfileStore for FsProfileStore {
    fn create(&self, platform: &str, profile_id: &str) -> Result<ProfileInfo> {
        self.create_with(platform, profile_id, lay_out)
    }

    fn get(&self, platform: &str, profile_id: &str) -> Result<ProfileInfo> {
        let (layout, metadata) = self.load(platform, profile_id)?;
        Ok(ProfileInfo::new(&layout, metadata))
    }

    fn list(&self, platform: Option<&str>) -> Result<Vec<ProfileKey>> {
        let mut keys = match platform {
            Some(platform) => {
                let dir = layout::platform_dir(&self.platforms_root, platform)?;
                self.scan_platform(&dir, &platform.trim().to_lowercase())?
            }
            None => {
                let read_dir = match fs::read_dir(&self.platforms_root) {
                    Ok(rd) => rd,
                    Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
                    Err(e) => return Err(e.into()),
                };
                let mut keys = Vec::new();
                for entry in read_dir {
                    let entry = entry?;
                    if entry.file_type()?.is_dir() {
                        let name = entry.file_name().to_string_lossy().into_owned();
                        keys.extend(self.scan_platform(&entry.path(), &name)?);
                    }
                }
                keys
            }
        };
        keys.sort();
        Ok(keys)
    }

    fn activate(&self, platform: &str, profile_id: &str) -> Result<ProfileInfo> {
        let (layout, mut metadata) = self.load(platform, profile_id)?;
        if metadata.status.is_active {
            debug!(profile = %layout.dir().display(), "profile already active");
            return Ok(ProfileInfo::new(&layout, metadata));
        }

        let pid = std::process::id();
        // Lock before flag: a reader that sees is_active=true always finds a
        // lock file.
        write_atomic(
            &layout.dir().join(&metadata.status.lock_file),
            pid.to_string().as_bytes(),
        )?;

        metadata.status.is_active = true;
        metadata.status.last_active_pid = Some(pid);
        metadata.last_used = Utc::now();
        metadata.save(&layout)?;

        info!(
            platform = layout.platform(),
            profile_id = layout.profile_id(),
            pid,
            "profile activated"
        );
        Ok(ProfileInfo::new(&layout, metadata))
    }

    fn deactivate(&self, platform: &str, profile_id: &str) -> Result<ProfileInfo> {
        let (layout, mut metadata) = self.load(platform, profile_id)?;
        let lock_file = layout.dir().join(&metadata.status.lock_file);

        if metadata.status.is_active {
            metadata.status.is_active = false;
            metadata.last_used = Utc::now();
            metadata.save(&layout)?;
            info!(
                platform = layout.platform(),
                profile_id = layout.profile_id(),
                "profile deactivated"
            );
        }

        match fs::remove_file(&lock_file) {
            Ok(()) => {}
            Err(e) if e.kind() == IoErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(ProfileInfo::new(&layout, metadata))
    }

    fn get_active(&self, platform: &str) -> Result<Vec<ProfileKey>> {
        let mut active = Vec::new();
        for key in self.list(Some(platform))? {
            match self.load(&key.platform, &key.profile_id) {
                Ok((_, metadata)) if metadata.status.is_active => active.push(key),
                Ok(_) => {}
                Err(e) => warn!(profile = %key, error = %e, "skipping unreadable profile"),
            }
        }
        Ok(active)
    }

    fn delete(&self, platform: &str, profile_id: &str, force: bool) -> Result<()> {
        let layout = self.layout(platform, profile_id)?;
        if !layout.dir().is_dir() {
            return Err(ProfileError::NotFound {
                platform: layout.platform().to_string(),
                profile_id: layout.profile_id().to_string(),
            });
        }

        match ProfileMetadata::load(&layout) {
            Ok(metadata) if metadata.status.is_active && !force => {
                return Err(ProfileError::ActiveProfile {
                    platform: layout.platform().to_string(),
                    profile_id: layout.profile_id().to_string(),
                });
            }
            Ok(_) => {}
            Err(e) if force => {
                warn!(profile = %layout.dir().display(), error = %e, "force-deleting unreadable profile");
            }
            Err(e) => return Err(e),
        }

        fs::remove_dir_all(layout.dir())?;
        info!(
            platform = layout.platform(),
            profile_id = layout.profile_id(),
            force,
            "profile deleted"
        );
        Ok(())
    }

    fn backup(&self, platform: &str, profile_id: &str) -> Result<Option<PathBuf>> {
        let info = self.get(platform, profile_id)?;
        let policy = info.metadata.backup;
        if !policy.enabled || policy.max_backups == 0 {
            debug!(profile = %info.key, "backups disabled");
            return Ok(None);
        }

        let backup_dir = info.backup_dir();
        let path = backup::copy_session(&info.session_file(), &backup_dir)?;
        let pruned = backup::prune(&backup_dir, policy.max_backups as usize)?;

        info!(profile = %info.key, path = %path.display(), pruned, "session backed up");
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use tweakio_shared::{ErrorKind, KdfParams, Salt};

    use super::*;
    use crate::directory::AppDirectories;

    fn store() -> (tempfile::TempDir, FsProfileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsProfileStore::new(&AppDirectories::at(dir.path()));
        (dir, store)
    }

    #[test]
    fn test_create_lays_out_skeleton() {
        let (_dir, store) = store();
        let info = store.create("WhatsApp", "A").unwrap();

        assert_eq!(info.key, ProfileKey::new("whatsapp", "A"));
        assert!(!info.is_active());
        assert_eq!(fs::read_to_string(info.session_file()).unwrap(), "{}");
        assert_eq!(fs::read_to_string(info.cookies_file()).unwrap(), "{}");
        assert!(info.fingerprint_file().is_file());
        assert!(info.cache_dir().is_dir());
        assert!(info.media_videos_dir().is_dir());
        assert!(info.backup_dir().is_dir());
        assert!(!info.database_file().exists());
    }

    #[test]
    fn test_create_is_exclusive() {
        let (_dir, store) = store();
        let first = store.create("whatsapp", "A").unwrap();

        let err = store.create("whatsapp", "A").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(store.get("whatsapp", "A").unwrap().metadata, first.metadata);
    }

    #[test]
    fn test_failed_create_leaves_nothing_behind() {
        let (_dir, store) = store();

        // A file squatting on the cache path makes the skeleton step fail.
        let err = store
            .create_with("whatsapp", "A", |layout| {
                fs::write(layout.dir().join(layout::CACHE_DIR), b"")?;
                lay_out(layout)
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);

        let layout = store.layout("whatsapp", "A").unwrap();
        assert!(!layout.dir().exists());
        assert!(store.list(Some("whatsapp")).unwrap().is_empty());

        let info = store.create("whatsapp", "A").unwrap();
        assert!(info.cache_dir().is_dir());
    }

    #[test]
    fn test_get_missing_and_corrupted() {
        let (_dir, store) = store();
        assert_eq!(
            store.get("whatsapp", "nobody").unwrap_err().kind(),
            ErrorKind::NotFound
        );

        let info = store.create("whatsapp", "A").unwrap();
        fs::write(info.dir.join("metadata.json"), "{not json").unwrap();
        assert_eq!(
            store.get("whatsapp", "A").unwrap_err().kind(),
            ErrorKind::Corrupted
        );
        assert_eq!(
            store.activate("whatsapp", "A").unwrap_err().kind(),
            ErrorKind::Corrupted
        );
    }

    #[test]
    fn test_list_only_complete_profiles() {
        let (dir, store) = store();
        assert!(store.list(None).unwrap().is_empty());
        assert!(store.list(Some("whatsapp")).unwrap().is_empty());

        store.create("whatsapp", "B").unwrap();
        store.create("whatsapp", "A").unwrap();
        store.create("telegram", "Z").unwrap();
        fs::create_dir_all(dir.path().join("platforms/whatsapp/half-made")).unwrap();

        let all: Vec<_> = store
            .list(None)
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(all, ["telegram:Z", "whatsapp:A", "whatsapp:B"]);

        let whatsapp = store.list(Some("WHATSAPP")).unwrap();
        assert_eq!(whatsapp.len(), 2);
    }

    #[test]
    fn test_activate_writes_lock_with_pid() {
        let (_dir, store) = store();
        store.create("whatsapp", "A").unwrap();

        let info = store.activate("whatsapp", "A").unwrap();
        let pid = std::process::id();
        assert!(info.is_active());
        assert_eq!(info.metadata.status.last_active_pid, Some(pid));
        assert_eq!(fs::read_to_string(info.lock_file()).unwrap(), pid.to_string());
        assert_eq!(store.lock_owner("whatsapp", "A").unwrap(), Some(pid));

        let again = store.activate("whatsapp", "A").unwrap();
        assert_eq!(again.metadata.last_used, info.metadata.last_used);
    }

    #[test]
    fn test_get_active_reads_disk_flags() {
        let (_dir, store) = store();
        store.create("whatsapp", "A").unwrap();
        store.create("whatsapp", "B").unwrap();
        store.activate("whatsapp", "B").unwrap();

        assert_eq!(
            store.get_active("whatsapp").unwrap(),
            vec![ProfileKey::new("whatsapp", "B")]
        );

        store.deactivate("whatsapp", "B").unwrap();
        assert!(store.get_active("whatsapp").unwrap().is_empty());
        assert_eq!(store.lock_owner("whatsapp", "B").unwrap(), None);
    }

    #[test]
    fn test_delete_guard() {
        let (_dir, store) = store();
        let info = store.create("whatsapp", "A").unwrap();
        store.activate("whatsapp", "A").unwrap();

        let err = store.delete("whatsapp", "A", false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ActiveProfile);
        assert!(info.dir.exists());

        store.delete("whatsapp", "A", true).unwrap();
        assert!(!info.dir.exists());
        assert_eq!(
            store.delete("whatsapp", "A", true).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_delete_inactive_without_force() {
        let (_dir, store) = store();
        let info = store.create("telegram", "A").unwrap();
        store.delete("telegram", "A", false).unwrap();
        assert!(!info.dir.exists());
        assert!(store.list(Some("telegram")).unwrap().is_empty());
    }

    #[test]
    fn test_backup_pruning_keeps_newest_three() {
        let (_dir, store) = store();
        store.create("whatsapp", "A").unwrap();
        store
            .set_backup_policy(
                "whatsapp",
                "A",
                BackupPolicy {
                    enabled: true,
                    max_backups: 3,
                },
            )
            .unwrap();

        let created: Vec<_> = (0..5)
            .map(|_| store.backup("whatsapp", "A").unwrap().unwrap())
            .collect();

        let remaining: Vec<_> = store
            .list_backups("whatsapp", "A")
            .unwrap()
            .into_iter()
            .map(|b| b.path)
            .collect();
        assert_eq!(remaining, vec![created[4].clone(), created[3].clone(), created[2].clone()]);
    }

    #[test]
    fn test_backup_disabled_is_noop() {
        let (_dir, store) = store();
        store.create("whatsapp", "A").unwrap();
        store
            .set_backup_policy(
                "whatsapp",
                "A",
                BackupPolicy {
                    enabled: false,
                    max_backups: 3,
                },
            )
            .unwrap();

        assert_eq!(store.backup("whatsapp", "A").unwrap(), None);
        assert!(store.list_backups("whatsapp", "A").unwrap().is_empty());
    }

    #[test]
    fn test_zero_backup_limit() {
        let (_dir, store) = store();
        store.create("whatsapp", "A").unwrap();

        let zero = BackupPolicy {
            enabled: true,
            max_backups: 0,
        };
        let err = store.set_backup_policy("whatsapp", "A", zero).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        // Hand-edited metadata with a zero limit backs nothing up.
        let (layout, mut metadata) = store.load("whatsapp", "A").unwrap();
        metadata.backup = zero;
        metadata.save(&layout).unwrap();

        assert_eq!(store.backup("whatsapp", "A").unwrap(), None);
        assert!(store.list_backups("whatsapp", "A").unwrap().is_empty());
    }

    #[test]
    fn test_encryption_settings_persist() {
        let (_dir, store) = store();
        store.create("whatsapp", "A").unwrap();

        let salt = Salt::generate();
        store
            .set_encryption(
                "whatsapp",
                "A",
                EncryptionSettings::argon2id(&salt, KdfParams::default()),
            )
            .unwrap();

        let info = store.get("whatsapp", "A").unwrap();
        assert_eq!(info.metadata.encryption.salt().unwrap(), Some(salt));
        assert_eq!(info.metadata.encryption.kdf.as_deref(), Some("argon2id"));
    }

    #[test]
    fn test_invalid_identifiers() {
        let (_dir, store) = store();
        assert_eq!(
            store.create("whatsapp", "../escape").unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            store.list(Some("")).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
    }
}
