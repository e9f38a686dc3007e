use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProfileError;
use crate::layout::ProfileLayout;
use crate::metadata::ProfileMetadata;

/// `(platform, profile_id)`, displayed as `platform:profile_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProfileKey {
    pub platform: String,
    pub profile_id: String,
}

impl ProfileKey {
    pub fn new(platform: impl Into<String>, profile_id: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            profile_id: profile_id.into(),
        }
    }
}

impl fmt::Display for ProfileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.platform, self.profile_id)
    }
}

impl FromStr for ProfileKey {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((platform, profile_id)) if !platform.is_empty() && !profile_id.is_empty() => {
                Ok(Self::new(platform.to_lowercase(), profile_id))
            }
            _ => Err(ProfileError::InvalidInput(format!(
                "expected platform:profile_id, got {s:?}"
            ))),
        }
    }
}

/// A profile's metadata together with its resolved location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileInfo {
    pub key: ProfileKey,
    pub dir: PathBuf,
    pub metadata: ProfileMetadata,
}

impl ProfileInfo {
    pub(crate) fn new(layout: &ProfileLayout, metadata: ProfileMetadata) -> Self {
        Self {
            key: ProfileKey::new(layout.platform(), layout.profile_id()),
            dir: layout.dir().to_path_buf(),
            metadata,
        }
    }

    pub fn is_active(&self) -> bool {
        self.metadata.status.is_active
    }

    fn resolve(&self, relative: &str) -> PathBuf {
        self.dir.join(Path::new(relative))
    }

    pub fn session_file(&self) -> PathBuf {
        self.resolve(&self.metadata.paths.session_file)
    }

    pub fn cookies_file(&self) -> PathBuf {
        self.resolve(&self.metadata.paths.cookies_file)
    }

    pub fn fingerprint_file(&self) -> PathBuf {
        self.resolve(&self.metadata.paths.fingerprint_file)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.resolve(&self.metadata.paths.cache_dir)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.resolve(&self.metadata.paths.backup_dir)
    }

    pub fn media_dir(&self) -> PathBuf {
        self.resolve(&self.metadata.paths.media_dir)
    }

    pub fn media_images_dir(&self) -> PathBuf {
        self.resolve(&self.metadata.paths.media_images)
    }

    pub fn media_videos_dir(&self) -> PathBuf {
        self.resolve(&self.metadata.paths.media_videos)
    }

    pub fn media_voice_dir(&self) -> PathBuf {
        self.resolve(&self.metadata.paths.media_voice)
    }

    pub fn media_documents_dir(&self) -> PathBuf {
        self.resolve(&self.metadata.paths.media_documents)
    }

    /// Where the profile's message store lives.
    pub fn database_file(&self) -> PathBuf {
        self.resolve(&self.metadata.paths.database_file)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.resolve(&self.metadata.status.lock_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display_and_parse() {
        let key = ProfileKey::new("whatsapp", "A");
        assert_eq!(key.to_string(), "whatsapp:A");
        assert_eq!("WhatsApp:A".parse::<ProfileKey>().unwrap(), key);
        assert!("whatsapp".parse::<ProfileKey>().is_err());
        assert!(":A".parse::<ProfileKey>().is_err());
    }

    #[test]
    fn test_keys_sort_by_platform_then_id() {
        let mut keys = vec![
            ProfileKey::new("whatsapp", "B"),
            ProfileKey::new("telegram", "Z"),
            ProfileKey::new("whatsapp", "A"),
        ];
        keys.sort();
        let shown: Vec<_> = keys.iter().map(ToString::to_string).collect();
        assert_eq!(shown, ["telegram:Z", "whatsapp:A", "whatsapp:B"]);
    }

    #[test]
    fn test_paths_resolve_under_profile_dir() {
        let layout = ProfileLayout::resolve(Path::new("/root/platforms"), "whatsapp", "A").unwrap();
        let info = ProfileInfo::new(&layout, ProfileMetadata::new(&layout));
        assert_eq!(
            info.database_file(),
            PathBuf::from("/root/platforms/whatsapp/A/messages.db")
        );
        assert_eq!(
            info.media_documents_dir(),
            PathBuf::from("/root/platforms/whatsapp/A/media/documents")
        );
        assert_eq!(info.lock_file(), layout.lock_file());
    }
}
