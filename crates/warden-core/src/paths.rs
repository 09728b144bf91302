//! Per-user directory layout.
//!
//! Config (policy file, .env) and state (pending queue, override
//! markers, PIN files, logs) live in the platform config/data dirs.
//! `WARDEN_CONFIG_DIR` / `WARDEN_DATA_DIR` override both for tests and
//! portable installs.

use std::path::PathBuf;

const APP_DIR: &str = "warden";

/// Directory holding `policy.json` and `.env`.
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("WARDEN_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Directory holding mutable state (pending queue, markers, PIN files).
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("WARDEN_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Directory holding the audit log.
pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Path of the policy file.
pub fn policy_file() -> PathBuf {
    config_dir().join("policy.json")
}

/// Create the config, data and log directories if missing.
pub fn ensure_dirs() -> std::io::Result<()> {
    std::fs::create_dir_all(config_dir())?;
    std::fs::create_dir_all(data_dir())?;
    std::fs::create_dir_all(log_dir())?;
    Ok(())
}
