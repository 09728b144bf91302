//! Error taxonomy and process exit codes.

use thiserror::Error;

/// Exit codes shared by every wardenctl verb.
pub mod exit {
    pub const OK: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const CONFIG: i32 = 2;
    pub const REMOTE: i32 = 3;
    pub const VALIDATION: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const INTERRUPTED: i32 = 130;
}

/// Typed failures for the core engine.
#[derive(Debug, Error)]
pub enum WardenError {
    /// Bad policy JSON, unknown timezone, invalid schedule.
    #[error("configuration error: {0}")]
    Config(String),

    /// Operator input that fails the validation grammar (domain, duration, id).
    #[error("validation error: {0}")]
    Validation(String),

    /// A domain landed in both the desired block and allow sets.
    #[error("policy conflict for '{0}': blocked and allowed simultaneously")]
    PolicyConflict(String),

    /// Unparseable state file; the caller quarantines and restarts empty.
    #[error("state file corrupt: {path}: {detail}")]
    StateCorruption { path: String, detail: String },

    /// Command refused because panic mode is active.
    #[error("'{operation}' refused: panic mode active until {until}")]
    OverrideViolation {
        operation: String,
        until: chrono::DateTime<chrono::Utc>,
    },

    /// PIN gate refused the operation.
    #[error("permission denied: {0}")]
    Permission(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl WardenError {
    /// Map the taxonomy onto the documented exit codes.
    pub fn exit_code(&self) -> i32 {
        match self {
            WardenError::Config(_) => exit::CONFIG,
            WardenError::Validation(_) | WardenError::PolicyConflict(_) => exit::VALIDATION,
            WardenError::Permission(_) => exit::PERMISSION,
            WardenError::OverrideViolation { .. } => exit::PERMISSION,
            WardenError::StateCorruption { .. } | WardenError::Io(_) => exit::GENERAL,
        }
    }
}
