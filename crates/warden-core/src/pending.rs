//! Durable queue of delayed unblock actions.
//!
//! One JSON file (`pending.json`), rewritten wholesale on every change
//! through the atomic-write/lock discipline in [`crate::state`]. The
//! reconciler executes due actions; the operator creates and cancels
//! them.

use crate::duration::Delay;
use crate::error::WardenError;
use crate::state;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

const PENDING_FILE: &str = "pending.json";
const ID_SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const ID_SUFFIX_LEN: usize = 6;

/// Days a terminal record is kept before garbage collection.
pub const RETENTION_DAYS: i64 = 7;

/// What kind of resource a pending action points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Domain,
    Category,
    Service,
}

/// A typed pending-action target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Target {
    #[serde(rename = "type")]
    pub kind: TargetKind,
    pub id: String,
}

impl Target {
    pub fn domain(name: &str) -> Self {
        Target {
            kind: TargetKind::Domain,
            id: crate::domain::normalize(name),
        }
    }

    pub fn category(id: &str) -> Self {
        Target {
            kind: TargetKind::Category,
            id: id.to_ascii_lowercase(),
        }
    }

    pub fn service(id: &str) -> Self {
        Target {
            kind: TargetKind::Service,
            id: id.to_ascii_lowercase(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TargetKind::Domain => write!(f, "{}", self.id),
            TargetKind::Category => write!(f, "category:{}", self.id),
            TargetKind::Service => write!(f, "service:{}", self.id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingStatus {
    Pending,
    Executed,
    Cancelled,
}

impl PendingStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PendingStatus::Pending)
    }
}

/// A delayed unblock commitment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: String,
    pub target: Target,
    pub created_at: DateTime<Utc>,
    pub execute_at: DateTime<Utc>,
    /// Original delay string, kept for display.
    pub delay: String,
    pub status: PendingStatus,
    #[serde(default = "default_requested_by")]
    pub requested_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

fn default_requested_by() -> String {
    "cli".to_string()
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PendingFile {
    actions: Vec<PendingAction>,
}

/// Result of a create request.
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    /// A new record was persisted.
    Created(PendingAction),
    /// A pending record for the same target already existed.
    Existing(PendingAction),
    /// Delay `"0"`: no record; the caller unblocks within this tick.
    Immediate,
}

/// File-backed store of pending actions.
pub struct PendingStore {
    path: PathBuf,
}

impl PendingStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(PENDING_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create a delayed unblock for `target`.
    ///
    /// `never` targets are refused upstream; a duplicate pending target
    /// returns the existing record unchanged.
    pub fn create(
        &self,
        target: Target,
        delay: &Delay,
        now: DateTime<Utc>,
        requested_by: &str,
    ) -> Result<CreateOutcome, WardenError> {
        let seconds = match delay.as_seconds() {
            None => {
                return Err(WardenError::Validation(format!(
                    "'{target}' is protected and cannot be unblocked"
                )))
            }
            Some(0) => return Ok(CreateOutcome::Immediate),
            Some(s) => s,
        };

        let _lock = state::lock_exclusive(&self.path)?;
        let mut file = self.load_unlocked(now)?;

        if let Some(existing) = file
            .actions
            .iter()
            .find(|a| a.status == PendingStatus::Pending && a.target == target)
        {
            tracing::warn!("pending action already exists for {target}");
            return Ok(CreateOutcome::Existing(existing.clone()));
        }

        let action = PendingAction {
            id: generate_action_id(now, &file.actions),
            target,
            created_at: now,
            execute_at: now + Duration::seconds(seconds),
            delay: delay.to_string(),
            status: PendingStatus::Pending,
            requested_by: requested_by.to_string(),
            outcome: None,
            resolved_at: None,
        };

        file.actions.push(action.clone());
        self.save_unlocked(&file)?;
        Ok(CreateOutcome::Created(action))
    }

    /// Cancel a pending action. Returns false for unknown ids and for
    /// records already in a terminal state.
    pub fn cancel(&self, id: &str, now: DateTime<Utc>) -> Result<Option<PendingAction>, WardenError> {
        let _lock = state::lock_exclusive(&self.path)?;
        let mut file = self.load_unlocked(now)?;

        let Some(action) = file.actions.iter_mut().find(|a| a.id == id) else {
            return Ok(None);
        };
        if action.status.is_terminal() {
            return Ok(None);
        }

        action.status = PendingStatus::Cancelled;
        action.resolved_at = Some(now);
        let cancelled = action.clone();
        self.save_unlocked(&file)?;
        Ok(Some(cancelled))
    }

    /// All actions; `include_history` keeps terminal records.
    pub fn list(
        &self,
        include_history: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<PendingAction>, WardenError> {
        let mut actions = self.load(now)?.actions;
        if !include_history {
            actions.retain(|a| a.status == PendingStatus::Pending);
        }
        actions.sort_by(|a, b| a.execute_at.cmp(&b.execute_at).then(a.id.cmp(&b.id)));
        Ok(actions)
    }

    pub fn get(&self, id: &str, now: DateTime<Utc>) -> Result<Option<PendingAction>, WardenError> {
        Ok(self.load(now)?.actions.into_iter().find(|a| a.id == id))
    }

    /// Pending actions whose execute_at has passed.
    pub fn due_actions(&self, now: DateTime<Utc>) -> Result<Vec<PendingAction>, WardenError> {
        let mut due: Vec<PendingAction> = self
            .load(now)?
            .actions
            .into_iter()
            .filter(|a| a.status == PendingStatus::Pending && a.execute_at <= now)
            .collect();
        due.sort_by(|a, b| a.execute_at.cmp(&b.execute_at).then(a.id.cmp(&b.id)));
        Ok(due)
    }

    /// Transition a record to executed with an outcome note.
    pub fn mark_executed(
        &self,
        id: &str,
        outcome: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, WardenError> {
        let _lock = state::lock_exclusive(&self.path)?;
        let mut file = self.load_unlocked(now)?;

        let Some(action) = file
            .actions
            .iter_mut()
            .find(|a| a.id == id && a.status == PendingStatus::Pending)
        else {
            return Ok(false);
        };

        action.status = PendingStatus::Executed;
        action.outcome = Some(outcome.to_string());
        action.resolved_at = Some(now);
        self.save_unlocked(&file)?;
        Ok(true)
    }

    /// Drop terminal records older than the retention window.
    pub fn gc(&self, now: DateTime<Utc>) -> Result<usize, WardenError> {
        let _lock = state::lock_exclusive(&self.path)?;
        let mut file = self.load_unlocked(now)?;
        let cutoff = now - Duration::days(RETENTION_DAYS);

        let before = file.actions.len();
        file.actions.retain(|a| {
            !(a.status.is_terminal() && a.resolved_at.map(|t| t < cutoff).unwrap_or(false))
        });
        let removed = before - file.actions.len();

        if removed > 0 {
            self.save_unlocked(&file)?;
            tracing::info!("garbage-collected {removed} pending action(s)");
        }
        Ok(removed)
    }

    fn load(&self, now: DateTime<Utc>) -> Result<PendingFile, WardenError> {
        let _lock = state::lock_shared(&self.path)?;
        self.parse_current(now)
    }

    // Callers hold the exclusive lock already.
    fn load_unlocked(&self, now: DateTime<Utc>) -> Result<PendingFile, WardenError> {
        self.parse_current(now)
    }

    fn parse_current(&self, now: DateTime<Utc>) -> Result<PendingFile, WardenError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(PendingFile::default())
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&raw) {
            Ok(file) => Ok(file),
            Err(e) => {
                // Unreadable queue: set it aside and restart empty
                // rather than blocking every future unblock.
                state::quarantine(&self.path, now)?;
                tracing::error!("pending store was corrupt and has been quarantined: {e}");
                Ok(PendingFile::default())
            }
        }
    }

    fn save_unlocked(&self, file: &PendingFile) -> Result<(), WardenError> {
        let json = serde_json::to_vec_pretty(file)
            .map_err(|e| WardenError::StateCorruption {
                path: self.path.display().to_string(),
                detail: e.to_string(),
            })?;
        state::write_atomic(&self.path, &json)?;
        Ok(())
    }
}

/// `pnd_YYYYMMDD_HHMMSS_<6 chars [a-z0-9]>`; retries on collision.
fn generate_action_id(now: DateTime<Utc>, existing: &[PendingAction]) -> String {
    loop {
        let suffix: String = (0..ID_SUFFIX_LEN)
            .map(|_| {
                let idx = OsRng.gen_range(0..ID_SUFFIX_CHARSET.len());
                ID_SUFFIX_CHARSET[idx] as char
            })
            .collect();
        let id = format!("pnd_{}_{suffix}", now.format("%Y%m%d_%H%M%S"));
        if !existing.iter().any(|a| a.id == id) {
            return id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_shape() {
        let now = chrono::TimeZone::with_ymd_and_hms(&Utc, 2025, 12, 15, 14, 30, 22).unwrap();
        let id = generate_action_id(now, &[]);
        assert!(id.starts_with("pnd_20251215_143022_"));
        assert_eq!(id.len(), "pnd_20251215_143022_".len() + ID_SUFFIX_LEN);
        let suffix = &id[id.len() - ID_SUFFIX_LEN..];
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_ids_distinct_within_second() {
        let now = Utc::now();
        let a = generate_action_id(now, &[]);
        let b = generate_action_id(now, &[]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_target_display() {
        assert_eq!(Target::domain("Reddit.COM").to_string(), "reddit.com");
        assert_eq!(Target::category("news").to_string(), "category:news");
        assert_eq!(Target::service("tiktok").to_string(), "service:tiktok");
    }
}
