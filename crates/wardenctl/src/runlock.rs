//! Single-flight run token for the reconciler tick.
//!
//! Nonblocking advisory lock on a file in the data directory. The
//! watchdog tick and a manual `sync` coordinate through it; the loser
//! exits cleanly with code 0 and an audit note.

use std::fs::{File, OpenOptions, TryLockError};
use std::path::Path;

const RUN_TOKEN: &str = "sync.lock";

/// Held run token; released when dropped.
pub struct RunToken {
    _file: File,
}

/// Outcome of a token acquisition attempt.
pub enum Acquire {
    Held(RunToken),
    /// Another tick is running right now.
    Busy,
}

pub fn acquire(data_dir: &Path) -> std::io::Result<Acquire> {
    std::fs::create_dir_all(data_dir)?;
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .open(data_dir.join(RUN_TOKEN))?;

    match file.try_lock() {
        Ok(()) => Ok(Acquire::Held(RunToken { _file: file })),
        Err(TryLockError::WouldBlock) => Ok(Acquire::Busy),
        Err(TryLockError::Error(e)) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_is_busy() {
        let dir = TempDir::new().unwrap();

        let first = acquire(dir.path()).unwrap();
        assert!(matches!(first, Acquire::Held(_)));

        let second = acquire(dir.path()).unwrap();
        assert!(matches!(second, Acquire::Busy));

        drop(first);
        let third = acquire(dir.path()).unwrap();
        assert!(matches!(third, Acquire::Held(_)));
    }
}
