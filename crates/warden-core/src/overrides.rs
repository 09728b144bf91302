//! Panic and pause: timed process-wide gates over the reconciler.
//!
//! Each mode is one marker file holding a single ISO-8601 expiration
//! instant. Pause replaces, never stacks, and can be ended early.
//! Panic has a 15-minute floor, can only be extended, and clears only
//! by expiring.

use crate::error::WardenError;
use crate::state;
use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};

const PAUSE_MARKER: &str = ".paused";
const PANIC_MARKER: &str = ".panic";

/// Minimum accepted panic duration.
pub const PANIC_MIN_MINUTES: i64 = 15;

/// Default pause when the operator gives no duration.
pub const DEFAULT_PAUSE_MINUTES: i64 = 30;

/// Override expirations in force at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverrideState {
    pub pause_until: Option<DateTime<Utc>>,
    pub panic_until: Option<DateTime<Utc>>,
}

impl OverrideState {
    pub fn pause_active(&self) -> bool {
        self.pause_until.is_some()
    }

    pub fn panic_active(&self) -> bool {
        self.panic_until.is_some()
    }

    /// Guard for operations refused while panic is active.
    pub fn refuse_during_panic(&self, operation: &str) -> Result<(), WardenError> {
        match self.panic_until {
            Some(until) => Err(WardenError::OverrideViolation {
                operation: operation.to_string(),
                until,
            }),
            None => Ok(()),
        }
    }
}

/// Marker-file store for both override modes.
pub struct OverrideStore {
    pause_path: PathBuf,
    panic_path: PathBuf,
}

impl OverrideStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            pause_path: data_dir.join(PAUSE_MARKER),
            panic_path: data_dir.join(PANIC_MARKER),
        }
    }

    /// Load both markers, dropping expired ones. Returns the state and
    /// whether an expired panic was cleared (the caller audits that).
    pub fn load(&self, now: DateTime<Utc>) -> Result<(OverrideState, bool), WardenError> {
        let pause_until = self.read_marker(&self.pause_path, now)?;
        let panic_before = self.panic_path.exists();
        let panic_until = self.read_marker(&self.panic_path, now)?;
        let panic_expired = panic_before && panic_until.is_none();

        Ok((
            OverrideState {
                pause_until,
                panic_until,
            },
            panic_expired,
        ))
    }

    /// Begin or replace a pause. Pauses do not stack.
    pub fn begin_pause(
        &self,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, WardenError> {
        let until = now + duration;
        self.write_marker(&self.pause_path, until)?;
        Ok(until)
    }

    /// End a pause early. Returns false when none was active.
    pub fn end_pause(&self, now: DateTime<Utc>) -> Result<bool, WardenError> {
        let active = self.read_marker(&self.pause_path, now)?.is_some();
        let _lock = state::lock_exclusive(&self.pause_path)?;
        remove_if_present(&self.pause_path)?;
        Ok(active)
    }

    /// Begin panic. Fails under the 15-minute floor and when panic is
    /// already active (use [`OverrideStore::extend_panic`]).
    pub fn begin_panic(
        &self,
        duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, WardenError> {
        if duration < Duration::minutes(PANIC_MIN_MINUTES) {
            return Err(WardenError::Validation(format!(
                "panic duration must be at least {PANIC_MIN_MINUTES} minutes"
            )));
        }
        if let Some(until) = self.read_marker(&self.panic_path, now)? {
            return Err(WardenError::Validation(format!(
                "panic already active until {until}; use 'panic extend'"
            )));
        }

        let until = now + duration;
        self.write_marker(&self.panic_path, until)?;
        Ok(until)
    }

    /// Extend an active panic by a positive delta. There is no way to
    /// shorten or end one.
    pub fn extend_panic(
        &self,
        delta: Duration,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, WardenError> {
        if delta <= Duration::zero() {
            return Err(WardenError::Validation(
                "panic extension must be positive".to_string(),
            ));
        }
        let Some(current) = self.read_marker(&self.panic_path, now)? else {
            return Err(WardenError::Validation(
                "panic is not active; use 'panic <duration>' to start one".to_string(),
            ));
        };

        let until = current + delta;
        self.write_marker(&self.panic_path, until)?;
        Ok(until)
    }

    fn write_marker(&self, path: &Path, until: DateTime<Utc>) -> Result<(), WardenError> {
        let _lock = state::lock_exclusive(path)?;
        state::write_atomic(
            path,
            until
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
                .as_bytes(),
        )?;
        Ok(())
    }

    /// Read a marker; expired markers are deleted, corrupt ones
    /// quarantined and treated as absent.
    fn read_marker(
        &self,
        path: &Path,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, WardenError> {
        let Some(raw) = state::read_locked(path)? else {
            return Ok(None);
        };

        let until = match DateTime::parse_from_rfc3339(raw.trim()) {
            Ok(t) => t.with_timezone(&Utc),
            Err(e) => {
                let _lock = state::lock_exclusive(path)?;
                state::quarantine(path, now)?;
                tracing::error!(
                    "override marker {} was corrupt and has been quarantined: {e}",
                    path.display()
                );
                return Ok(None);
            }
        };

        if until <= now {
            let _lock = state::lock_exclusive(path)?;
            remove_if_present(path)?;
            return Ok(None);
        }

        Ok(Some(until))
    }
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, OverrideStore) {
        let dir = TempDir::new().unwrap();
        let store = OverrideStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_pause_replaces_not_stacks() {
        let (_dir, store) = store();
        let now = Utc::now();

        let first = store.begin_pause(Duration::minutes(30), now).unwrap();
        let second = store.begin_pause(Duration::minutes(10), now).unwrap();
        assert!(second < first);

        let (state, _) = store.load(now).unwrap();
        assert_eq!(state.pause_until, Some(second));
    }

    #[test]
    fn test_pause_expires() {
        let (_dir, store) = store();
        let now = Utc::now();
        store.begin_pause(Duration::minutes(5), now).unwrap();

        let (state, _) = store.load(now + Duration::minutes(6)).unwrap();
        assert!(!state.pause_active());
    }

    #[test]
    fn test_panic_minimum_boundary() {
        let (_dir, store) = store();
        let now = Utc::now();

        let too_short = Duration::minutes(14) + Duration::seconds(59);
        assert!(store.begin_panic(too_short, now).is_err());
        assert!(store.begin_panic(Duration::minutes(15), now).is_ok());
    }

    #[test]
    fn test_panic_rejects_restart_while_active() {
        let (_dir, store) = store();
        let now = Utc::now();
        store.begin_panic(Duration::minutes(30), now).unwrap();
        assert!(store.begin_panic(Duration::minutes(60), now).is_err());
    }

    #[test]
    fn test_panic_extend_only_forward() {
        let (_dir, store) = store();
        let now = Utc::now();
        let until = store.begin_panic(Duration::minutes(15), now).unwrap();

        assert!(store.extend_panic(Duration::zero(), now).is_err());
        assert!(store.extend_panic(Duration::minutes(-5), now).is_err());

        let extended = store.extend_panic(Duration::minutes(45), now).unwrap();
        assert_eq!(extended, until + Duration::minutes(45));
    }

    #[test]
    fn test_panic_extend_requires_active() {
        let (_dir, store) = store();
        assert!(store.extend_panic(Duration::minutes(5), Utc::now()).is_err());
    }

    #[test]
    fn test_panic_clears_only_on_expiry() {
        let (_dir, store) = store();
        let now = Utc::now();
        store.begin_panic(Duration::minutes(15), now).unwrap();

        let (state, expired) = store.load(now + Duration::minutes(14)).unwrap();
        assert!(state.panic_active());
        assert!(!expired);

        let (state, expired) = store.load(now + Duration::minutes(16)).unwrap();
        assert!(!state.panic_active());
        assert!(expired);
    }

    #[test]
    fn test_corrupt_marker_quarantined() {
        let (dir, store) = store();
        std::fs::write(dir.path().join(".panic"), "definitely not a date").unwrap();

        let (state, _) = store.load(Utc::now()).unwrap();
        assert!(!state.panic_active());
        assert!(std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().starts_with(".panic.bak.")));
    }

    #[test]
    fn test_refuse_during_panic() {
        let until = Utc::now() + Duration::minutes(30);
        let state = OverrideState {
            pause_until: None,
            panic_until: Some(until),
        };
        let err = state.refuse_during_panic("unblock").unwrap_err();
        assert!(err.to_string().contains("unblock"));
        assert!(matches!(err, WardenError::OverrideViolation { until: u, .. } if u == until));

        let idle = OverrideState::default();
        assert!(idle.refuse_during_panic("unblock").is_ok());
    }
}
