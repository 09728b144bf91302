//! PIN gate over sensitive operations.
//!
//! Optional. When set, `unblock`, `pause`, `allow` and the config
//! operations require a verified session. The hash file stores
//! `salt_hex:hash_hex` (PBKDF2-SHA256, 600 000 iterations); the
//! plaintext PIN never touches disk or logs. Removal is a pending
//! unlock request with a 24-hour delay.

use crate::error::WardenError;
use crate::state;
use chrono::{DateTime, Duration, Utc};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::path::{Path, PathBuf};

pub const PIN_MIN_LENGTH: usize = 4;
pub const PIN_MAX_LENGTH: usize = 32;
pub const PIN_SESSION_MINUTES: i64 = 30;
pub const PIN_MAX_ATTEMPTS: usize = 3;
pub const PIN_LOCKOUT_MINUTES: i64 = 15;
pub const PIN_HASH_ITERATIONS: u32 = 600_000;
pub const PIN_REMOVAL_DELAY_HOURS: u32 = 24;

const HASH_FILE: &str = ".pin_hash";
const SESSION_FILE: &str = ".pin_session";
const ATTEMPTS_FILE: &str = ".pin_attempts";

const SALT_LEN: usize = 32;
const HASH_LEN: usize = 32;

/// Result of a PIN verification attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Correct; a 30-minute session is now open.
    Verified { session_until: DateTime<Utc> },
    /// Wrong PIN; carries the failure count inside the window.
    Incorrect { failures: usize },
    /// Too many recent failures; verification refused entirely.
    LockedOut { until: DateTime<Utc> },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AttemptWindow {
    failures: Vec<DateTime<Utc>>,
}

/// File-backed PIN state.
pub struct PinGate {
    hash_path: PathBuf,
    session_path: PathBuf,
    attempts_path: PathBuf,
    iterations: u32,
}

impl PinGate {
    pub fn new(data_dir: &Path) -> Self {
        Self::with_iterations(data_dir, PIN_HASH_ITERATIONS)
    }

    /// Lower iteration counts are for tests only.
    pub fn with_iterations(data_dir: &Path, iterations: u32) -> Self {
        Self {
            hash_path: data_dir.join(HASH_FILE),
            session_path: data_dir.join(SESSION_FILE),
            attempts_path: data_dir.join(ATTEMPTS_FILE),
            iterations,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.hash_path.exists()
    }

    /// Set or replace the PIN. Clears any session and failure window.
    pub fn set(&self, pin: &str) -> Result<(), WardenError> {
        if pin.len() < PIN_MIN_LENGTH {
            return Err(WardenError::Validation(format!(
                "PIN must be at least {PIN_MIN_LENGTH} characters"
            )));
        }
        if pin.len() > PIN_MAX_LENGTH {
            return Err(WardenError::Validation(format!(
                "PIN must be at most {PIN_MAX_LENGTH} characters"
            )));
        }

        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let hash = derive_hash(pin, &salt, self.iterations);

        let _lock = state::lock_exclusive(&self.hash_path)?;
        state::write_atomic(
            &self.hash_path,
            format!("{}:{}", to_hex(&salt), to_hex(&hash)).as_bytes(),
        )?;
        self.clear_session()?;
        self.clear_attempts()?;
        Ok(())
    }

    /// Verify a PIN. A success opens a session; a failure is recorded
    /// toward lockout.
    pub fn verify(&self, pin: &str, now: DateTime<Utc>) -> Result<VerifyOutcome, WardenError> {
        if let Some(until) = self.lockout_until(now)? {
            return Ok(VerifyOutcome::LockedOut { until });
        }

        let Some(stored) = state::read_locked(&self.hash_path)? else {
            return Err(WardenError::Validation("no PIN is set".to_string()));
        };

        let Some((salt_hex, hash_hex)) = stored.trim().split_once(':') else {
            let _lock = state::lock_exclusive(&self.hash_path)?;
            state::quarantine(&self.hash_path, now)?;
            return Err(WardenError::StateCorruption {
                path: self.hash_path.display().to_string(),
                detail: "malformed PIN hash file".to_string(),
            });
        };
        let salt = from_hex(salt_hex).ok_or_else(|| WardenError::StateCorruption {
            path: self.hash_path.display().to_string(),
            detail: "bad salt encoding".to_string(),
        })?;

        let computed = to_hex(&derive_hash(pin, &salt, self.iterations));
        if constant_time_eq(computed.as_bytes(), hash_hex.as_bytes()) {
            self.clear_attempts()?;
            let session_until = self.open_session(now)?;
            Ok(VerifyOutcome::Verified { session_until })
        } else {
            let failures = self.record_failure(now)?;
            Ok(VerifyOutcome::Incorrect { failures })
        }
    }

    /// Whether a verified session is currently open. Always true when
    /// no PIN is configured.
    pub fn session_valid(&self, now: DateTime<Utc>) -> Result<bool, WardenError> {
        if !self.is_enabled() {
            return Ok(true);
        }
        let Some(raw) = state::read_locked(&self.session_path)? else {
            return Ok(false);
        };
        match DateTime::parse_from_rfc3339(raw.trim()) {
            Ok(until) => Ok(until.with_timezone(&Utc) > now),
            Err(_) => {
                let _lock = state::lock_exclusive(&self.session_path)?;
                state::quarantine(&self.session_path, now)?;
                Ok(false)
            }
        }
    }

    /// Gate check used by command entry points.
    pub fn require_session(&self, operation: &str, now: DateTime<Utc>) -> Result<(), WardenError> {
        if let Some(until) = self.lockout_until(now)? {
            return Err(WardenError::Permission(format!(
                "PIN locked out until {until}; '{operation}' refused"
            )));
        }
        if self.session_valid(now)? {
            return Ok(());
        }
        Err(WardenError::Permission(format!(
            "'{operation}' requires PIN verification (run 'protection pin verify')"
        )))
    }

    /// Delete the hash immediately. Only the unlock-request executor
    /// calls this; operator removal goes through the 24-hour delay.
    pub fn remove_now(&self) -> Result<bool, WardenError> {
        if !self.is_enabled() {
            return Ok(false);
        }
        let _lock = state::lock_exclusive(&self.hash_path)?;
        std::fs::remove_file(&self.hash_path)?;
        self.clear_session()?;
        self.clear_attempts()?;
        Ok(true)
    }

    /// Expiration of the current lockout, if one is in force.
    pub fn lockout_until(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, WardenError> {
        let window = self.attempt_window(now)?;
        if window.failures.len() < PIN_MAX_ATTEMPTS {
            return Ok(None);
        }
        let oldest = window.failures.iter().min().copied();
        Ok(oldest.map(|t| t + Duration::minutes(PIN_LOCKOUT_MINUTES)))
    }

    pub fn failed_attempts(&self, now: DateTime<Utc>) -> Result<usize, WardenError> {
        Ok(self.attempt_window(now)?.failures.len())
    }

    pub fn session_remaining(&self, now: DateTime<Utc>) -> Result<Option<Duration>, WardenError> {
        if !self.is_enabled() {
            return Ok(None);
        }
        let Some(raw) = state::read_locked(&self.session_path)? else {
            return Ok(None);
        };
        let Ok(until) = DateTime::parse_from_rfc3339(raw.trim()) else {
            return Ok(None);
        };
        let remaining = until.with_timezone(&Utc) - now;
        Ok((remaining > Duration::zero()).then_some(remaining))
    }

    fn open_session(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, WardenError> {
        let until = now + Duration::minutes(PIN_SESSION_MINUTES);
        let _lock = state::lock_exclusive(&self.session_path)?;
        state::write_atomic(
            &self.session_path,
            until
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
                .as_bytes(),
        )?;
        Ok(until)
    }

    fn record_failure(&self, now: DateTime<Utc>) -> Result<usize, WardenError> {
        let _lock = state::lock_exclusive(&self.attempts_path)?;
        let mut window = prune_window(read_raw(&self.attempts_path)?, now);
        window.failures.push(now);
        let json = serde_json::to_vec(&window).map_err(|e| WardenError::StateCorruption {
            path: self.attempts_path.display().to_string(),
            detail: e.to_string(),
        })?;
        state::write_atomic(&self.attempts_path, &json)?;
        Ok(window.failures.len())
    }

    fn attempt_window(&self, now: DateTime<Utc>) -> Result<AttemptWindow, WardenError> {
        let _lock = state::lock_shared(&self.attempts_path)?;
        Ok(prune_window(read_raw(&self.attempts_path)?, now))
    }

    fn clear_session(&self) -> Result<(), WardenError> {
        remove_quiet(&self.session_path)
    }

    fn clear_attempts(&self) -> Result<(), WardenError> {
        remove_quiet(&self.attempts_path)
    }
}

fn read_raw(path: &Path) -> Result<Option<String>, WardenError> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn prune_window(raw: Option<String>, now: DateTime<Utc>) -> AttemptWindow {
    let mut window: AttemptWindow = raw
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default();
    let cutoff = now - Duration::minutes(PIN_LOCKOUT_MINUTES);
    window.failures.retain(|t| *t > cutoff);
    window
}

fn remove_quiet(path: &Path) -> Result<(), WardenError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn derive_hash(pin: &str, salt: &[u8], iterations: u32) -> [u8; HASH_LEN] {
    let mut hash = [0u8; HASH_LEN];
    pbkdf2_hmac::<Sha256>(pin.as_bytes(), salt, iterations, &mut hash);
    hash
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn from_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_round_trip() {
        let bytes = [0u8, 1, 0xab, 0xff];
        assert_eq!(from_hex(&to_hex(&bytes)).unwrap(), bytes);
        assert!(from_hex("abc").is_none());
        assert!(from_hex("zz").is_none());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abcd", b"abcd"));
        assert!(!constant_time_eq(b"abcd", b"abce"));
        assert!(!constant_time_eq(b"abcd", b"abc"));
    }

    #[test]
    fn test_derive_hash_is_salted() {
        let a = derive_hash("1234", b"salt-a", 1000);
        let b = derive_hash("1234", b"salt-b", 1000);
        assert_ne!(a, b);
        assert_eq!(a, derive_hash("1234", b"salt-a", 1000));
    }
}
