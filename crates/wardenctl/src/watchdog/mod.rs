//! Self-healing periodic scheduling of the reconciler tick.
//!
//! One platform handler per host scheduler, all behind [`Scheduler`]:
//! a 120-second tick task plus a 300-second heal task that re-registers
//! the tick if the platform lost it. A disable marker in the data dir
//! makes scheduled invocations no-op without touching the registration.

mod cron;
mod launchd;
mod systemd;
#[cfg(target_os = "windows")]
mod windows;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};
use warden_core::state;

pub const SYNC_INTERVAL_SECS: u64 = 120;
pub const HEAL_INTERVAL_SECS: u64 = 300;

const DISABLE_MARKER: &str = ".watchdog_disabled";
const PERMANENT: &str = "permanent";

/// Which host scheduler owns the registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    SystemdUser,
    Cron,
    Launchd,
    TaskScheduler,
}

impl Platform {
    pub fn label(&self) -> &'static str {
        match self {
            Platform::SystemdUser => "systemd user timer",
            Platform::Cron => "crontab",
            Platform::Launchd => "launchd",
            Platform::TaskScheduler => "Task Scheduler",
        }
    }
}

/// Probe the host for the right scheduler.
///
/// WSL and systemd-less Linux fall back to cron; the systemd probe is
/// the canonical `/run/systemd/system` check.
pub fn detect_platform() -> Platform {
    if cfg!(target_os = "macos") {
        return Platform::Launchd;
    }
    if cfg!(target_os = "windows") {
        return Platform::TaskScheduler;
    }
    if is_wsl() || !Path::new("/run/systemd/system").exists() {
        return Platform::Cron;
    }
    Platform::SystemdUser
}

fn is_wsl() -> bool {
    std::fs::read_to_string("/proc/sys/kernel/osrelease")
        .map(|release| {
            let release = release.to_ascii_lowercase();
            release.contains("microsoft") || release.contains("wsl")
        })
        .unwrap_or(false)
}

/// Common surface of every platform handler.
pub trait Scheduler {
    /// Register the tick and heal tasks, invoking `exe`.
    fn install(&self, exe: &Path) -> Result<()>;
    fn uninstall(&self) -> Result<()>;
    fn is_installed(&self) -> Result<bool>;
    fn label(&self) -> &'static str;
}

pub fn scheduler_for(platform: Platform) -> Box<dyn Scheduler> {
    match platform {
        Platform::SystemdUser => Box::new(systemd::SystemdScheduler),
        Platform::Cron => Box::new(cron::CronScheduler),
        Platform::Launchd => Box::new(launchd::LaunchdScheduler),
        Platform::TaskScheduler => {
            #[cfg(target_os = "windows")]
            {
                Box::new(windows::TaskSchedulerHandler)
            }
            #[cfg(not(target_os = "windows"))]
            {
                // Unreachable off Windows; cron is the safe stand-in.
                Box::new(cron::CronScheduler)
            }
        }
    }
}

/// How long the watchdog is disabled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisableState {
    Enabled,
    DisabledUntil(DateTime<Utc>),
    DisabledPermanently,
}

fn marker_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DISABLE_MARKER)
}

/// Write the disable marker. `None` means permanent.
pub fn disable(data_dir: &Path, duration: Option<Duration>, now: DateTime<Utc>) -> Result<DisableState> {
    let path = marker_path(data_dir);
    let (contents, disable_state) = match duration {
        Some(d) => {
            let until = now + d;
            (
                until.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                DisableState::DisabledUntil(until),
            )
        }
        None => (PERMANENT.to_string(), DisableState::DisabledPermanently),
    };
    let _lock = state::lock_exclusive(&path)?;
    state::write_atomic(&path, contents.as_bytes())?;
    Ok(disable_state)
}

/// Remove the disable marker.
pub fn enable(data_dir: &Path) -> Result<bool> {
    let path = marker_path(data_dir);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Read the disable marker; an expired timed marker is cleaned up.
pub fn disable_state(data_dir: &Path, now: DateTime<Utc>) -> Result<DisableState> {
    let path = marker_path(data_dir);
    let Some(raw) = state::read_locked(&path)? else {
        return Ok(DisableState::Enabled);
    };
    let raw = raw.trim();

    if raw == PERMANENT {
        return Ok(DisableState::DisabledPermanently);
    }

    match DateTime::parse_from_rfc3339(raw) {
        Ok(until) => {
            let until = until.with_timezone(&Utc);
            if until <= now {
                let _ = std::fs::remove_file(&path);
                Ok(DisableState::Enabled)
            } else {
                Ok(DisableState::DisabledUntil(until))
            }
        }
        Err(_) => {
            state::quarantine(&path, now)?;
            Ok(DisableState::Enabled)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_disable_timed_then_expires() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();

        let disabled = disable(dir.path(), Some(Duration::hours(2)), now).unwrap();
        assert!(matches!(disabled, DisableState::DisabledUntil(_)));

        assert!(matches!(
            disable_state(dir.path(), now + Duration::hours(1)).unwrap(),
            DisableState::DisabledUntil(_)
        ));
        assert_eq!(
            disable_state(dir.path(), now + Duration::hours(3)).unwrap(),
            DisableState::Enabled
        );
        // Expired marker is gone.
        assert!(!dir.path().join(DISABLE_MARKER).exists());
    }

    #[test]
    fn test_disable_permanent_until_enabled() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();

        disable(dir.path(), None, now).unwrap();
        assert_eq!(
            disable_state(dir.path(), now + Duration::days(365)).unwrap(),
            DisableState::DisabledPermanently
        );

        assert!(enable(dir.path()).unwrap());
        assert_eq!(
            disable_state(dir.path(), now).unwrap(),
            DisableState::Enabled
        );
        assert!(!enable(dir.path()).unwrap());
    }

    #[test]
    fn test_corrupt_marker_treated_enabled() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(DISABLE_MARKER), "garbage").unwrap();
        assert_eq!(
            disable_state(dir.path(), Utc::now()).unwrap(),
            DisableState::Enabled
        );
    }
}
