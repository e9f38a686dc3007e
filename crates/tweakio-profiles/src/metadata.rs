//! `metadata.json`: the on-disk record of a profile.

use std::fs::{self, File};
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tweakio_shared::{KdfParams, Salt};

use crate::error::{ProfileError, Result};
use crate::layout::{self, ProfileLayout};

pub const METADATA_VERSION: &str = env!("CARGO_PKG_VERSION");

static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileMetadata {
    pub profile_id: String,
    pub platform: String,
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
    pub paths: ProfilePaths,
    pub backup: BackupPolicy,
    #[serde(default)]
    pub encryption: EncryptionSettings,
    pub status: ProfileStatus,
}

/// File and directory names, relative to the profile directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilePaths {
    pub session_file: String,
    pub fingerprint_file: String,
    pub cookies_file: String,
    pub cache_dir: String,
    pub backup_dir: String,
    pub media_dir: String,
    pub media_images: String,
    pub media_videos: String,
    pub media_voice: String,
    pub media_documents: String,
    pub database_file: String,
}

impl Default for ProfilePaths {
    fn default() -> Self {
        let media = |sub: &str| format!("{}/{sub}", layout::MEDIA_DIR);
        Self {
            session_file: layout::SESSION_FILE.into(),
            fingerprint_file: layout::FINGERPRINT_FILE.into(),
            cookies_file: layout::COOKIES_FILE.into(),
            cache_dir: layout::CACHE_DIR.into(),
            backup_dir: layout::BACKUP_DIR.into(),
            media_dir: layout::MEDIA_DIR.into(),
            media_images: media("images"),
            media_videos: media("videos"),
            media_voice: media("voice"),
            media_documents: media("documents"),
            database_file: layout::DATABASE_FILE.into(),
        }
    }
}

impl ProfilePaths {
    fn entries(&self) -> [&str; 11] {
        [
            self.session_file.as_str(),
            self.fingerprint_file.as_str(),
            self.cookies_file.as_str(),
            self.cache_dir.as_str(),
            self.backup_dir.as_str(),
            self.media_dir.as_str(),
            self.media_images.as_str(),
            self.media_videos.as_str(),
            self.media_voice.as_str(),
            self.media_documents.as_str(),
            self.database_file.as_str(),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupPolicy {
    pub enabled: bool,
    pub max_backups: u32,
}

impl Default for BackupPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_backups: 10,
        }
    }
}

/// Salt and KDF settings for the profile's password-derived key.
/// Empty (`{}`) until a key is initialised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionSettings {
    /// Base64 salt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kdf: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kdf_params: Option<KdfParams>,
}

impl EncryptionSettings {
    pub fn argon2id(salt: &Salt, params: KdfParams) -> Self {
        Self {
            salt: Some(salt.to_base64()),
            kdf: Some(tweakio_shared::constants::KDF_NAME.into()),
            kdf_params: Some(params),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.salt.is_some()
    }

    /// Decoded salt, if one has been stored.
    pub fn salt(&self) -> std::result::Result<Option<Salt>, String> {
        match &self.salt {
            None => Ok(None),
            Some(encoded) => Salt::from_base64(encoded)
                .map(Some)
                .map_err(|e| format!("invalid salt: {e}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileStatus {
    pub is_active: bool,
    pub last_active_pid: Option<u32>,
    pub lock_file: String,
}

impl Default for ProfileStatus {
    fn default() -> Self {
        Self {
            is_active: false,
            last_active_pid: None,
            lock_file: layout::LOCK_FILE.into(),
        }
    }
}

impl ProfileMetadata {
    /// Fresh metadata for a newly created profile.
    pub fn new(layout: &ProfileLayout) -> Self {
        let now = Utc::now();
        Self {
            profile_id: layout.profile_id().to_string(),
            platform: layout.platform().to_string(),
            version: METADATA_VERSION.to_string(),
            created_at: now,
            last_used: now,
            paths: ProfilePaths::default(),
            backup: BackupPolicy::default(),
            encryption: EncryptionSettings::default(),
            status: ProfileStatus::default(),
        }
    }

    /// Read and check the metadata of `layout`.
    ///
    /// A missing file is `NotFound`; unparseable JSON, missing keys or values
    /// that do not belong to this profile are `Corrupted`.
    pub fn load(layout: &ProfileLayout) -> Result<Self> {
        let path = layout.metadata_file();
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                return Err(ProfileError::NotFound {
                    platform: layout.platform().to_string(),
                    profile_id: layout.profile_id().to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let corrupted = |reason: String| ProfileError::Corrupted {
            path: path.clone(),
            reason,
        };

        let metadata: Self = serde_json::from_slice(&raw).map_err(|e| corrupted(e.to_string()))?;

        if metadata.profile_id != layout.profile_id()
            || !metadata.platform.eq_ignore_ascii_case(layout.platform())
        {
            return Err(corrupted(format!(
                "metadata describes {}:{}",
                metadata.platform, metadata.profile_id
            )));
        }
        if let Some(bad) = metadata
            .paths
            .entries()
            .into_iter()
            .chain([metadata.status.lock_file.as_str()])
            .find(|p| p.is_empty() || Path::new(p).is_absolute() || p.contains(".."))
        {
            return Err(corrupted(format!("path entry {bad:?} escapes the profile")));
        }
        metadata.encryption.salt().map_err(corrupted)?;

        Ok(metadata)
    }

    pub fn save(&self, layout: &ProfileLayout) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(&layout.metadata_file(), &json)
    }
}

/// Write `contents` next to `path` and rename it into place, so readers see
/// either the old file or the new one.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let seq = STAGING_SEQ.fetch_add(1, Ordering::Relaxed);
    let staging = path.with_file_name(format!(".{file_name}.{}.{seq}.tmp", std::process::id()));

    let result = (|| -> std::io::Result<()> {
        let mut file = File::create(&staging)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&staging, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&staging);
    }
    Ok(result?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(root: &Path) -> ProfileLayout {
        ProfileLayout::resolve(root, "whatsapp", "A").unwrap()
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(dir.path());
        fs::create_dir_all(layout.dir()).unwrap();

        let metadata = ProfileMetadata::new(&layout);
        metadata.save(&layout).unwrap();

        let loaded = ProfileMetadata::load(&layout).unwrap();
        assert_eq!(loaded, metadata);
        assert_eq!(loaded.paths.media_voice, "media/voice");
        assert!(loaded.backup.enabled);
        assert_eq!(loaded.backup.max_backups, 10);
    }

    #[test]
    fn test_empty_encryption_object_serialises_as_braces() {
        let dir = tempfile::tempdir().unwrap();
        let json = serde_json::to_value(ProfileMetadata::new(&layout(dir.path()))).unwrap();
        assert_eq!(json["encryption"], serde_json::json!({}));
        assert_eq!(json["status"]["lock_file"], ".lock");
        assert!(json["status"]["last_active_pid"].is_null());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = ProfileMetadata::load(&layout(dir.path())).unwrap_err();
        assert!(matches!(err, ProfileError::NotFound { .. }));
    }

    #[test]
    fn test_missing_keys_are_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(dir.path());
        fs::create_dir_all(layout.dir()).unwrap();
        fs::write(
            layout.metadata_file(),
            r#"{"profile_id": "A", "platform": "whatsapp"}"#,
        )
        .unwrap();

        let err = ProfileMetadata::load(&layout).unwrap_err();
        assert!(matches!(err, ProfileError::Corrupted { .. }));
    }

    #[test]
    fn test_foreign_metadata_is_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(dir.path());
        let other = ProfileLayout::resolve(dir.path(), "whatsapp", "B").unwrap();
        fs::create_dir_all(layout.dir()).unwrap();

        ProfileMetadata::new(&other).save(&layout).unwrap();
        assert!(matches!(
            ProfileMetadata::load(&layout),
            Err(ProfileError::Corrupted { .. })
        ));
    }

    #[test]
    fn test_escaping_path_is_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(dir.path());
        fs::create_dir_all(layout.dir()).unwrap();

        let mut metadata = ProfileMetadata::new(&layout);
        metadata.paths.session_file = "../../etc/passwd".into();
        metadata.save(&layout).unwrap();
        assert!(ProfileMetadata::load(&layout).is_err());
    }

    #[test]
    fn test_atomic_write_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("file.json");
        write_atomic(&target, b"one").unwrap();
        write_atomic(&target, b"two").unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"two");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
