//! Shared persistence discipline for small state files.
//!
//! Every state write goes through write-temp/fsync/rename so a crash
//! leaves either the old or the new file, never a hybrid. Writers
//! serialize on an exclusive lock over a sidecar `.lock` file; readers
//! take the same lock shared. Unparseable files are quarantined with a
//! `.bak.<timestamp>` suffix rather than deleted.

use crate::error::WardenError;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Held lock over a state file's sidecar; released on drop.
pub struct StateLock {
    _file: File,
}

fn lock_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "state".to_string());
    path.with_file_name(format!("{name}.lock"))
}

fn open_lock_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .write(true)
        .open(lock_path(path))
}

/// Take the exclusive (writer) lock for `path`.
pub fn lock_exclusive(path: &Path) -> std::io::Result<StateLock> {
    let file = open_lock_file(path)?;
    file.lock()?;
    Ok(StateLock { _file: file })
}

/// Take the shared (reader) lock for `path`.
pub fn lock_shared(path: &Path) -> std::io::Result<StateLock> {
    let file = open_lock_file(path)?;
    file.lock_shared()?;
    Ok(StateLock { _file: file })
}

/// Write `contents` to `path` atomically: temp file in the same
/// directory, fsync, rename over the target.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "state".to_string());
    let tmp = parent.join(format!(".{name}.tmp"));

    let mut file = File::create(&tmp)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Read `path` under a shared lock. `Ok(None)` when the file is absent.
pub fn read_locked(path: &Path) -> std::io::Result<Option<String>> {
    let _lock = lock_shared(path)?;
    match File::open(path) {
        Ok(mut file) => {
            let mut contents = String::new();
            file.read_to_string(&mut contents)?;
            Ok(Some(contents))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Move a corrupt state file aside and report where it went.
pub fn quarantine(path: &Path, now: chrono::DateTime<chrono::Utc>) -> Result<PathBuf, WardenError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "state".to_string());
    let backup = path.with_file_name(format!("{name}.bak.{}", now.timestamp()));
    std::fs::rename(path, &backup)?;
    tracing::error!(
        "quarantined corrupt state file {} -> {}",
        path.display(),
        backup.display()
    );
    Ok(backup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        write_atomic(&path, b"{\"a\": 1}").unwrap();
        assert_eq!(read_locked(&path).unwrap().unwrap(), "{\"a\": 1}");

        write_atomic(&path, b"{\"a\": 2}").unwrap();
        assert_eq!(read_locked(&path).unwrap().unwrap(), "{\"a\": 2}");

        // No temp file left behind.
        assert!(!dir.path().join(".state.json.tmp").exists());
    }

    #[test]
    fn test_read_missing_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(read_locked(&dir.path().join("absent.json"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_quarantine_moves_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pending.json");
        std::fs::write(&path, "not json").unwrap();

        let backup = quarantine(&path, Utc::now()).unwrap();
        assert!(!path.exists());
        assert!(backup.exists());
        assert!(backup
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("pending.json.bak."));
    }

    #[test]
    fn test_locks_are_reentrant_across_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        {
            let _w = lock_exclusive(&path).unwrap();
        }
        let _r1 = lock_shared(&path).unwrap();
        let _r2 = lock_shared(&path).unwrap();
    }
}
