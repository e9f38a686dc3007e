//! The single place profile paths are computed.

use std::path::{Path, PathBuf};

use crate::error::{ProfileError, Result};

pub const METADATA_FILE: &str = "metadata.json";
pub const LOCK_FILE: &str = ".lock";
pub const SESSION_FILE: &str = "session.json";
pub const COOKIES_FILE: &str = "cookies.json";
pub const FINGERPRINT_FILE: &str = "fingerprint.pkl";
pub const DATABASE_FILE: &str = "messages.db";
pub const CACHE_DIR: &str = "cache";
pub const BACKUP_DIR: &str = "backups";
pub const MEDIA_DIR: &str = "media";
pub const MEDIA_SUBDIRS: [&str; 4] = ["images", "videos", "voice", "documents"];

/// Location of one profile: `<platforms_root>/<platform>/<profile_id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileLayout {
    platform: String,
    profile_id: String,
    dir: PathBuf,
}

impl ProfileLayout {
    /// Validate the identifiers and compute the profile directory.
    ///
    /// Platform names are case-insensitive and stored lower-cased. Neither
    /// identifier may be empty or anything other than a plain file name.
    pub fn resolve(platforms_root: &Path, platform: &str, profile_id: &str) -> Result<Self> {
        let platform = validate_component("platform", platform)?.to_lowercase();
        let profile_id = validate_component("profile id", profile_id)?.to_string();
        let dir = platforms_root.join(&platform).join(&profile_id);

        Ok(Self {
            platform,
            profile_id,
            dir,
        })
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn profile_id(&self) -> &str {
        &self.profile_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn platform_dir(&self) -> &Path {
        self.dir.parent().unwrap_or(&self.dir)
    }

    pub fn metadata_file(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    pub fn session_file(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.dir.join(BACKUP_DIR)
    }

    /// Directories `create` lays down inside the profile directory.
    pub fn skeleton_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.dir.join(CACHE_DIR), self.backup_dir()];
        let media = self.dir.join(MEDIA_DIR);
        dirs.extend(MEDIA_SUBDIRS.iter().map(|sub| media.join(sub)));
        dirs
    }
}

/// Lower-cased platform directory name, validated the same way as in
/// [`ProfileLayout::resolve`].
pub fn platform_dir(platforms_root: &Path, platform: &str) -> Result<PathBuf> {
    let platform = validate_component("platform", platform)?.to_lowercase();
    Ok(platforms_root.join(platform))
}

fn validate_component<'a>(what: &str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    let invalid = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\', ':', '\0']);
    if invalid {
        return Err(ProfileError::InvalidInput(format!(
            "{what} must be a non-empty plain name, got {value:?}"
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_lowercases_platform() {
        let layout = ProfileLayout::resolve(Path::new("/data/platforms"), "WhatsApp", "A").unwrap();
        assert_eq!(layout.platform(), "whatsapp");
        assert_eq!(layout.dir(), Path::new("/data/platforms/whatsapp/A"));
        assert_eq!(layout.platform_dir(), Path::new("/data/platforms/whatsapp"));
        assert_eq!(layout.lock_file(), Path::new("/data/platforms/whatsapp/A/.lock"));
    }

    #[test]
    fn test_rejects_path_tricks() {
        let root = Path::new("/data/platforms");
        for bad in ["", "  ", ".", "..", "a/b", "a\\b", "x:y"] {
            assert!(ProfileLayout::resolve(root, "whatsapp", bad).is_err(), "{bad:?}");
            assert!(ProfileLayout::resolve(root, bad, "A").is_err(), "{bad:?}");
        }
    }

    #[test]
    fn test_skeleton_covers_media() {
        let layout = ProfileLayout::resolve(Path::new("/p"), "telegram", "B").unwrap();
        let dirs = layout.skeleton_dirs();
        assert_eq!(dirs.len(), 6);
        assert!(dirs.contains(&PathBuf::from("/p/telegram/B/media/voice")));
    }
}
