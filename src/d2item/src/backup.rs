//! Backups taken before an item file is overwritten.
//!
//! Next to `items.d2i` live `items.d2i.bak` (the bytes as first seen) and
//! `items.d2i.bak.json`, which records the SHA-256 of that copy and of the bytes
//! this library last wrote. A file matching either digest is one we already know
//! about and keeps the existing backup; any other content replaces it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Digests tracked for one backed-up file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// SHA-256 of the bytes copied into the backup
    pub backup_sha256: String,

    /// SHA-256 of the bytes last written through [`write_with_backup`]
    pub written_sha256: String,
}

impl BackupRecord {
    pub fn new(digest: String) -> Self {
        BackupRecord {
            backup_sha256: digest.clone(),
            written_sha256: digest,
        }
    }

    fn knows(&self, digest: &str) -> bool {
        self.backup_sha256 == digest || self.written_sha256 == digest
    }
}

/// Hex SHA-256 of a byte slice
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn hash_file(path: &Path) -> Result<String, BackupError> {
    Ok(digest(&fs::read(path)?))
}

/// Backup copy and record path for a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupPaths {
    pub copy: PathBuf,
    pub record: PathBuf,
}

impl BackupPaths {
    pub fn for_file(path: &Path) -> Self {
        let with_suffix = |suffix: &str| {
            let mut name = path
                .file_name()
                .map(OsString::from)
                .unwrap_or_default();
            name.push(suffix);
            path.with_file_name(name)
        };
        BackupPaths {
            copy: with_suffix(".bak"),
            record: with_suffix(".bak.json"),
        }
    }

    pub fn read_record(&self) -> Result<Option<BackupRecord>, BackupError> {
        if !self.record.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&self.record)?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    pub fn write_record(&self, record: &BackupRecord) -> Result<(), BackupError> {
        fs::write(&self.record, serde_json::to_string_pretty(record)?)?;
        Ok(())
    }
}

/// Whether the current content of `path` needs a fresh backup.
///
/// An existing backup without a record is never overwritten.
pub fn needs_backup(path: &Path, paths: &BackupPaths) -> Result<bool, BackupError> {
    if !paths.copy.exists() {
        return Ok(true);
    }
    let Some(record) = paths.read_record()? else {
        return Ok(false);
    };
    Ok(!record.knows(&hash_file(path)?))
}

/// Copy `path` to its backup if needed; returns whether a copy was made
pub fn ensure_backup(path: &Path) -> Result<bool, BackupError> {
    if !path.exists() {
        return Ok(false);
    }
    let paths = BackupPaths::for_file(path);
    if !needs_backup(path, &paths)? {
        return Ok(false);
    }
    fs::copy(path, &paths.copy)?;
    paths.write_record(&BackupRecord::new(hash_file(path)?))?;
    tracing::debug!(path = %path.display(), backup = %paths.copy.display(), "backup created");
    Ok(true)
}

/// Back up `path` if needed, write `bytes` to it and record the write.
///
/// Returns whether a backup was made.
pub fn write_with_backup(path: &Path, bytes: &[u8]) -> Result<bool, BackupError> {
    let created = ensure_backup(path)?;
    fs::write(path, bytes)?;

    let paths = BackupPaths::for_file(path);
    let written = digest(bytes);
    let mut record = paths
        .read_record()?
        .unwrap_or_else(|| BackupRecord::new(written.clone()));
    record.written_sha256 = written;
    paths.write_record(&record)?;
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest() {
        assert_eq!(
            digest(b"JM"),
            hex::encode(Sha256::digest([0x4A, 0x4D]))
        );
        assert_eq!(digest(&[]).len(), 64);
    }

    #[test]
    fn test_paths_keep_extension() {
        let paths = BackupPaths::for_file(Path::new("/tmp/stash.d2i"));
        assert_eq!(paths.copy, PathBuf::from("/tmp/stash.d2i.bak"));
        assert_eq!(paths.record, PathBuf::from("/tmp/stash.d2i.bak.json"));
    }

    #[test]
    fn test_first_write_backs_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("item.bin");
        fs::write(&path, b"original").unwrap();

        assert!(write_with_backup(&path, b"edited").unwrap());
        let paths = BackupPaths::for_file(&path);
        assert_eq!(fs::read(&paths.copy).unwrap(), b"original");
        assert_eq!(fs::read(&path).unwrap(), b"edited");

        let record = paths.read_record().unwrap().unwrap();
        assert_eq!(record.backup_sha256, digest(b"original"));
        assert_eq!(record.written_sha256, digest(b"edited"));
    }

    #[test]
    fn test_own_edits_keep_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("item.bin");
        fs::write(&path, b"original").unwrap();

        write_with_backup(&path, b"first").unwrap();
        assert!(!write_with_backup(&path, b"second").unwrap());
        let paths = BackupPaths::for_file(&path);
        assert_eq!(fs::read(&paths.copy).unwrap(), b"original");
    }

    #[test]
    fn test_replaced_file_gets_new_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("item.bin");
        fs::write(&path, b"original").unwrap();
        write_with_backup(&path, b"edited").unwrap();

        fs::write(&path, b"restored by hand from elsewhere").unwrap();
        assert!(ensure_backup(&path).unwrap());
        let paths = BackupPaths::for_file(&path);
        assert_eq!(
            fs::read(&paths.copy).unwrap(),
            b"restored by hand from elsewhere"
        );
    }

    #[test]
    fn test_unrecorded_backup_is_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("item.bin");
        fs::write(&path, b"current").unwrap();
        let paths = BackupPaths::for_file(&path);
        fs::write(&paths.copy, b"hand made").unwrap();

        assert!(!needs_backup(&path, &paths).unwrap());
        assert!(!ensure_backup(&path).unwrap());
        assert_eq!(fs::read(&paths.copy).unwrap(), b"hand made");
    }

    #[test]
    fn test_new_file_has_nothing_to_back_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.bin");
        assert!(!write_with_backup(&path, b"new").unwrap());
        assert_eq!(fs::read(&path).unwrap(), b"new");
    }
}
