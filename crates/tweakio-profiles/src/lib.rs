//! # tweakio-profiles
//!
//! Per-platform, per-account profiles on disk, plus the in-process registry
//! of active profiles.
//!
//! A profile lives at `<data>/platforms/<platform>/<profile_id>/` and holds
//! the session and cookie blobs, a fingerprint placeholder, cache, media and
//! backup directories, the message database, `metadata.json` and, while
//! active, a `.lock` file with the owning process id.

pub mod backup;
pub mod directory;
pub mod layout;
pub mod metadata;
pub mod profile;
pub mod registry;
pub mod store;

mod error;

pub use backup::BackupEntry;
pub use directory::{AppDirectories, DirectoryResolver};
pub use error::{ProfileError, Result};
pub use layout::ProfileLayout;
pub use metadata::{BackupPolicy, EncryptionSettings, ProfileMetadata, ProfileStatus};
pub use profile::{ProfileInfo, ProfileKey};
pub use registry::{ActiveProfileGuard, ActiveProfileRegistry};
pub use store::{FsProfileStore, ProfileStore};
