//! Delayed unlock requests for locked items.
//!
//! Locked native categories/services (and the PIN itself) cannot be
//! removed on the spot; the operator files a request that becomes
//! executable after the configured delay (default 48 h, floor 24 h)
//! and stays cancellable until then. Execution rewrites the policy
//! file atomically.

use crate::audit::{AuditLog, AuditVerb};
use crate::error::WardenError;
use crate::pin::PinGate;
use crate::policy::{locked_transition_errors, Policy};
use crate::state;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const UNLOCK_FILE: &str = "unlock_requests.json";
const ID_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const ID_LEN: usize = 12;

/// What kind of locked item a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlockKind {
    Category,
    Service,
    Pin,
}

impl UnlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnlockKind::Category => "category",
            UnlockKind::Service => "service",
            UnlockKind::Pin => "pin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlockStatus {
    Pending,
    Executed,
    Cancelled,
}

/// A delayed request to remove a locked item from policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockRequest {
    pub id: String,
    pub kind: UnlockKind,
    pub item_id: String,
    pub created_at: DateTime<Utc>,
    pub execute_at: DateTime<Utc>,
    pub delay_hours: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub status: UnlockStatus,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct UnlockFile {
    requests: Vec<UnlockRequest>,
}

/// File-backed store of unlock requests.
pub struct UnlockStore {
    path: PathBuf,
}

impl UnlockStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(UNLOCK_FILE),
        }
    }

    /// File a request. The delay floor is enforced here regardless of
    /// what the caller passes.
    pub fn create(
        &self,
        kind: UnlockKind,
        item_id: &str,
        delay_hours: u32,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<UnlockRequest, WardenError> {
        let delay_hours = delay_hours.max(crate::policy::MIN_UNLOCK_DELAY_HOURS);

        let _lock = state::lock_exclusive(&self.path)?;
        let mut file = self.load_unlocked(now)?;

        if let Some(existing) = file.requests.iter().find(|r| {
            r.status == UnlockStatus::Pending && r.kind == kind && r.item_id == item_id
        }) {
            return Ok(existing.clone());
        }

        let request = UnlockRequest {
            id: generate_request_id(&file.requests),
            kind,
            item_id: item_id.to_string(),
            created_at: now,
            execute_at: now + Duration::hours(i64::from(delay_hours)),
            delay_hours,
            reason,
            status: UnlockStatus::Pending,
        };
        file.requests.push(request.clone());
        self.save_unlocked(&file)?;
        Ok(request)
    }

    /// Cancel by id or unique id prefix.
    pub fn cancel(&self, id_prefix: &str, now: DateTime<Utc>) -> Result<Option<UnlockRequest>, WardenError> {
        let _lock = state::lock_exclusive(&self.path)?;
        let mut file = self.load_unlocked(now)?;

        let matching: Vec<usize> = file
            .requests
            .iter()
            .enumerate()
            .filter(|(_, r)| r.status == UnlockStatus::Pending && r.id.starts_with(id_prefix))
            .map(|(i, _)| i)
            .collect();
        if matching.len() != 1 {
            return Ok(None);
        }

        let request = &mut file.requests[matching[0]];
        request.status = UnlockStatus::Cancelled;
        let cancelled = request.clone();
        self.save_unlocked(&file)?;
        Ok(Some(cancelled))
    }

    pub fn pending(&self, now: DateTime<Utc>) -> Result<Vec<UnlockRequest>, WardenError> {
        let mut requests: Vec<UnlockRequest> = self
            .load(now)?
            .requests
            .into_iter()
            .filter(|r| r.status == UnlockStatus::Pending)
            .collect();
        requests.sort_by(|a, b| a.execute_at.cmp(&b.execute_at).then(a.id.cmp(&b.id)));
        Ok(requests)
    }

    /// Pending requests whose delay has elapsed.
    pub fn executable(&self, now: DateTime<Utc>) -> Result<Vec<UnlockRequest>, WardenError> {
        Ok(self
            .pending(now)?
            .into_iter()
            .filter(|r| r.execute_at <= now)
            .collect())
    }

    /// The pending PIN-removal request, if any.
    pub fn pin_removal(&self, now: DateTime<Utc>) -> Result<Option<UnlockRequest>, WardenError> {
        Ok(self
            .pending(now)?
            .into_iter()
            .find(|r| r.kind == UnlockKind::Pin))
    }

    /// Execute one due request: strip the item out of the policy file
    /// (or delete the PIN hash) and mark the record executed.
    pub fn execute(
        &self,
        request_id: &str,
        policy_path: &Path,
        pin: &PinGate,
        audit: &AuditLog,
        now: DateTime<Utc>,
    ) -> Result<bool, WardenError> {
        let _lock = state::lock_exclusive(&self.path)?;
        let mut file = self.load_unlocked(now)?;

        let Some(request) = file
            .requests
            .iter_mut()
            .find(|r| r.id == request_id && r.status == UnlockStatus::Pending)
        else {
            return Ok(false);
        };
        if request.execute_at > now {
            tracing::warn!("unlock request {} not yet executable", request.id);
            return Ok(false);
        }

        match request.kind {
            UnlockKind::Pin => {
                pin.remove_now()?;
                audit.record(AuditVerb::PinRemoved, "protection", &[]);
            }
            UnlockKind::Category | UnlockKind::Service => {
                remove_native_entry(policy_path, request.kind, &request.item_id)?;
            }
        }

        request.status = UnlockStatus::Executed;
        audit.record(
            AuditVerb::UnlockExecute,
            &format!("{}:{}", request.kind.as_str(), request.item_id),
            &[],
        );
        self.save_unlocked(&file)?;
        Ok(true)
    }

    fn load(&self, now: DateTime<Utc>) -> Result<UnlockFile, WardenError> {
        let _lock = state::lock_shared(&self.path)?;
        self.parse_current(now)
    }

    fn load_unlocked(&self, now: DateTime<Utc>) -> Result<UnlockFile, WardenError> {
        self.parse_current(now)
    }

    fn parse_current(&self, now: DateTime<Utc>) -> Result<UnlockFile, WardenError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(UnlockFile::default()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&raw) {
            Ok(file) => Ok(file),
            Err(e) => {
                state::quarantine(&self.path, now)?;
                tracing::error!("unlock store was corrupt and has been quarantined: {e}");
                Ok(UnlockFile::default())
            }
        }
    }

    fn save_unlocked(&self, file: &UnlockFile) -> Result<(), WardenError> {
        let json = serde_json::to_vec_pretty(file).map_err(|e| WardenError::StateCorruption {
            path: self.path.display().to_string(),
            detail: e.to_string(),
        })?;
        state::write_atomic(&self.path, &json)?;
        Ok(())
    }
}

/// Rewrite the policy file without the named native entry.
///
/// The removal is checked against the locked-transition rules so an
/// unlock execution can never smuggle extra weakening in.
fn remove_native_entry(
    policy_path: &Path,
    kind: UnlockKind,
    item_id: &str,
) -> Result<(), WardenError> {
    let raw = std::fs::read_to_string(policy_path)
        .map_err(|e| WardenError::Config(format!("cannot read policy file: {e}")))?;
    let old: Policy = serde_json::from_str(&raw)
        .map_err(|e| WardenError::Config(format!("invalid policy JSON: {e}")))?;

    let mut new = old.clone();
    if let Some(nextdns) = &mut new.nextdns {
        match kind {
            UnlockKind::Category => nextdns.categories.retain(|c| c.id != item_id),
            UnlockKind::Service => nextdns.services.retain(|s| s.id != item_id),
            UnlockKind::Pin => {}
        }
    }

    // The only acceptable diff is the requested removal itself.
    let violations: Vec<String> = locked_transition_errors(&old, &new)
        .into_iter()
        .filter(|e| !e.contains(&format!("'{item_id}'")))
        .collect();
    if !violations.is_empty() {
        return Err(WardenError::Validation(violations.join("; ")));
    }

    let json = serde_json::to_string_pretty(&new)
        .map_err(|e| WardenError::Config(format!("cannot serialize policy: {e}")))?;
    let _lock = state::lock_exclusive(policy_path)?;
    state::write_atomic(policy_path, json.as_bytes())?;
    Ok(())
}

fn generate_request_id(existing: &[UnlockRequest]) -> String {
    loop {
        let id: String = (0..ID_LEN)
            .map(|_| {
                let idx = OsRng.gen_range(0..ID_CHARSET.len());
                ID_CHARSET[idx] as char
            })
            .collect();
        if !existing.iter().any(|r| r.id == id) {
            return id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_shape() {
        let id = generate_request_id(&[]);
        assert_eq!(id.len(), ID_LEN);
        assert!(id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_unlock_kind_labels() {
        assert_eq!(UnlockKind::Category.as_str(), "category");
        assert_eq!(UnlockKind::Pin.as_str(), "pin");
    }
}
