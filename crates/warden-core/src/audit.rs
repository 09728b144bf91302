//! Append-only audit log.
//!
//! Separate from the tracing stream: one human-readable line per
//! decision or mutation, flushed immediately, written under a
//! short-lived exclusive lock so concurrent processes never interleave
//! within a line.
//!
//! Line format: `YYYY-MM-DDTHH:MM:SSZ | VERB | OBJECT | k=v k=v`
//! Watchdog-actor entries carry a ` | WD | ` segment after the
//! timestamp.

use chrono::{DateTime, SecondsFormat, Utc};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Who performed the audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Reconciler,
    User,
    Watchdog,
}

/// Closed set of audited verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditVerb {
    Block,
    Unblock,
    Allow,
    Disallow,
    PcActivate,
    PcDeactivate,
    PanicStart,
    PanicExtend,
    PanicEnd,
    Pause,
    Resume,
    PendingCreate,
    PendingExecute,
    PendingCancel,
    Sync,
    PinSet,
    PinVerified,
    PinFailed,
    PinLockedOut,
    PinRemoved,
    UnlockRequest,
    UnlockCancel,
    UnlockExecute,
}

impl AuditVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditVerb::Block => "BLOCK",
            AuditVerb::Unblock => "UNBLOCK",
            AuditVerb::Allow => "ALLOW",
            AuditVerb::Disallow => "DISALLOW",
            AuditVerb::PcActivate => "PC_ACTIVATE",
            AuditVerb::PcDeactivate => "PC_DEACTIVATE",
            AuditVerb::PanicStart => "PANIC_START",
            AuditVerb::PanicExtend => "PANIC_EXTEND",
            AuditVerb::PanicEnd => "PANIC_END",
            AuditVerb::Pause => "PAUSE",
            AuditVerb::Resume => "RESUME",
            AuditVerb::PendingCreate => "PENDING_CREATE",
            AuditVerb::PendingExecute => "PENDING_EXECUTE",
            AuditVerb::PendingCancel => "PENDING_CANCEL",
            AuditVerb::Sync => "SYNC",
            AuditVerb::PinSet => "PIN_SET",
            AuditVerb::PinVerified => "PIN_VERIFIED",
            AuditVerb::PinFailed => "PIN_FAILED",
            AuditVerb::PinLockedOut => "PIN_LOCKED_OUT",
            AuditVerb::PinRemoved => "PIN_REMOVED",
            AuditVerb::UnlockRequest => "UNLOCK_REQUEST",
            AuditVerb::UnlockCancel => "UNLOCK_CANCEL",
            AuditVerb::UnlockExecute => "UNLOCK_EXECUTE",
        }
    }
}

/// Handle on the audit file.
pub struct AuditLog {
    path: PathBuf,
    actor: Actor,
}

impl AuditLog {
    pub fn new(log_dir: &Path, actor: Actor) -> Self {
        Self {
            path: log_dir.join("audit.log"),
            actor,
        }
    }

    /// Append one entry; errors are logged, never propagated, so an
    /// unwritable audit file cannot abort a tick.
    pub fn record(&self, verb: AuditVerb, object: &str, detail: &[(&str, String)]) {
        self.record_at(Utc::now(), verb, object, detail);
    }

    pub fn record_at(
        &self,
        at: DateTime<Utc>,
        verb: AuditVerb,
        object: &str,
        detail: &[(&str, String)],
    ) {
        let mut line = at.to_rfc3339_opts(SecondsFormat::Secs, true);
        if self.actor == Actor::Watchdog {
            line.push_str(" | WD");
        }
        line.push_str(" | ");
        line.push_str(verb.as_str());
        line.push_str(" | ");
        line.push_str(object);
        if !detail.is_empty() {
            line.push_str(" | ");
            let kvs: Vec<String> = detail.iter().map(|(k, v)| format!("{k}={v}")).collect();
            line.push_str(&kvs.join(" "));
        }
        line.push('\n');

        if let Err(e) = self.append(&line) {
            tracing::error!("failed to write audit entry: {e}");
        }
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.lock()?;
        let mut file = file;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
