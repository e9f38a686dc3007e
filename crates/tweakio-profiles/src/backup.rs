//! Timestamped session backups with count-based pruning.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::Serialize;

const PREFIX: &str = "session_";
const EXTENSION: &str = "json";
const MAX_SAME_SECOND: u32 = 999;

/// One file in a profile's backup directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupEntry {
    pub file_name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
}

/// Copy `session` into `backup_dir` as `session_<YYYYMMDD_HHMMSS>.json`.
///
/// A second backup within the same second gets a `_001`, `_002`... suffix
/// instead of replacing the first.
pub fn copy_session(session: &Path, backup_dir: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(backup_dir)?;
    let mut source = File::open(session)?;

    let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
    for n in 0..=MAX_SAME_SECOND {
        let file_name = if n == 0 {
            format!("{PREFIX}{stamp}.{EXTENSION}")
        } else {
            format!("{PREFIX}{stamp}_{n:03}.{EXTENSION}")
        };
        let target = backup_dir.join(file_name);

        match OpenOptions::new().write(true).create_new(true).open(&target) {
            Ok(mut dest) => {
                io::copy(&mut source, &mut dest)?;
                dest.sync_all()?;
                return Ok(target);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        ErrorKind::AlreadyExists,
        format!("more than {MAX_SAME_SECOND} backups within one second"),
    ))
}

/// Backups in `backup_dir`, newest first. A missing directory is empty.
pub fn list(backup_dir: &Path) -> io::Result<Vec<BackupEntry>> {
    let read_dir = match fs::read_dir(backup_dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut entries = Vec::new();
    for entry in read_dir {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if !is_backup_name(&file_name) {
            continue;
        }
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let modified: SystemTime = meta.modified()?;
        entries.push(BackupEntry {
            file_name,
            path: entry.path(),
            size_bytes: meta.len(),
            modified: modified.into(),
        });
    }

    // Same-tick mtimes fall back to the name; suffixed names sort after the
    // plain name of the same second.
    entries.sort_by(|a, b| {
        b.modified
            .cmp(&a.modified)
            .then_with(|| b.file_name.cmp(&a.file_name))
    });
    Ok(entries)
}

/// Delete all but the `keep` newest backups. Returns how many were removed.
pub fn prune(backup_dir: &Path, keep: usize) -> io::Result<usize> {
    let mut removed = 0;
    for old in list(backup_dir)?.into_iter().skip(keep) {
        match fs::remove_file(&old.path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(removed)
}

fn is_backup_name(name: &str) -> bool {
    name.starts_with(PREFIX)
        && Path::new(name).extension().and_then(|e| e.to_str()) == Some(EXTENSION)
}
