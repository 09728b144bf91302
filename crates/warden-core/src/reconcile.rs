//! The reconciler: a pure function from snapshots to a mutation plan.
//!
//! Given the policy, the override state, the pending queue and the
//! cached remote state, `compute_plan` decides the minimal diff for one
//! tick. Identical inputs always yield the identical plan: every
//! collection is ordered, nothing depends on map iteration order, and
//! no I/O happens here. Applying the plan is the caller's job.

use crate::domain;
use crate::overrides::OverrideState;
use crate::pending::{PendingAction, Target, TargetKind};
use crate::policy::PolicySnapshot;
use crate::schedule::{is_available, Schedule};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::BTreeSet;

/// Cached remote state the plan diffs against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteSnapshot {
    pub denylist: BTreeSet<String>,
    pub allowlist: BTreeSet<String>,
    pub active_categories: BTreeSet<String>,
    pub active_services: BTreeSet<String>,
}

/// A due pending action the tick will execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingExecution {
    pub action_id: String,
    pub target: Target,
    /// The target is also in the desired-block set this tick: the
    /// unblock still happens, the next tick re-blocks per schedule.
    pub reblock_expected: bool,
}

/// Minimal mutation diff for one tick, in application order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickPlan {
    pub deny_remove: Vec<String>,
    pub deny_add: Vec<String>,
    pub allow_remove: Vec<String>,
    pub allow_add: Vec<String>,
    pub categories_on: Vec<String>,
    pub categories_off: Vec<String>,
    pub services_on: Vec<String>,
    pub services_off: Vec<String>,
    /// Domains skipped because they landed in both desired sets.
    pub conflicts: Vec<String>,
    pub pending_executions: Vec<PendingExecution>,
    /// Deny-side additions suppressed by an active pause.
    pub suppressed_by_pause: Vec<String>,
}

impl TickPlan {
    pub fn is_empty(&self) -> bool {
        self.deny_remove.is_empty()
            && self.deny_add.is_empty()
            && self.allow_remove.is_empty()
            && self.allow_add.is_empty()
            && self.categories_on.is_empty()
            && self.categories_off.is_empty()
            && self.services_on.is_empty()
            && self.services_off.is_empty()
            && self.pending_executions.is_empty()
    }

    pub fn mutation_count(&self) -> usize {
        self.deny_remove.len()
            + self.deny_add.len()
            + self.allow_remove.len()
            + self.allow_add.len()
            + self.categories_on.len()
            + self.categories_off.len()
            + self.services_on.len()
            + self.services_off.len()
    }
}

fn blocked_now(schedule: Option<&Schedule>, now: DateTime<Utc>, zone: Tz) -> bool {
    match schedule {
        // No schedule on a block-side entry: never available.
        None => true,
        Some(s) => !is_available(s, now, zone),
    }
}

/// Compute the tick plan. Pure; see module docs.
pub fn compute_plan(
    policy: &PolicySnapshot,
    overrides: &OverrideState,
    pending: &[PendingAction],
    remote: &RemoteSnapshot,
    now: DateTime<Utc>,
) -> TickPlan {
    let zone = policy.zone;
    let panic = overrides.panic_active();
    let paused = overrides.pause_active();

    // Desired sets.
    let mut desired_block: BTreeSet<String> = BTreeSet::new();
    for entry in &policy.policy.blocklist {
        let name = domain::normalize(&entry.domain);
        if panic || blocked_now(entry.schedule.as_ref(), now, zone) {
            desired_block.insert(name);
        }
    }
    for category in &policy.policy.categories {
        let category_blocked = panic || blocked_now(category.schedule.as_ref(), now, zone);
        if category_blocked {
            for member in &category.domains {
                desired_block.insert(domain::normalize(member));
            }
        }
    }

    let mut desired_allow: BTreeSet<String> = BTreeSet::new();
    if !panic {
        for entry in &policy.policy.allowlist {
            let name = domain::normalize(&entry.domain);
            let allowed = match &entry.schedule {
                // No schedule on an allow-side entry: always available.
                None => true,
                Some(s) => is_available(s, now, zone),
            };
            if allowed {
                desired_allow.insert(name);
            }
        }
    }

    // A domain in both desired sets is a policy bug: skip it entirely.
    let conflicts: BTreeSet<String> = desired_block
        .intersection(&desired_allow)
        .cloned()
        .collect();
    for name in &conflicts {
        tracing::error!("policy conflict: '{name}' is both blocked and allowed; skipping");
        desired_block.remove(name);
        desired_allow.remove(name);
    }

    let mut desired_categories_on: BTreeSet<String> = BTreeSet::new();
    let mut desired_categories_off: BTreeSet<String> = BTreeSet::new();
    let mut desired_services_on: BTreeSet<String> = BTreeSet::new();
    let mut desired_services_off: BTreeSet<String> = BTreeSet::new();
    if let Some(nextdns) = &policy.policy.nextdns {
        for cat in &nextdns.categories {
            if panic || blocked_now(cat.schedule.as_ref(), now, zone) {
                desired_categories_on.insert(cat.id.clone());
            } else {
                desired_categories_off.insert(cat.id.clone());
            }
        }
        for svc in &nextdns.services {
            if panic || blocked_now(svc.schedule.as_ref(), now, zone) {
                desired_services_on.insert(svc.id.clone());
            } else {
                desired_services_off.insert(svc.id.clone());
            }
        }
    }

    // Pending executions. Panic defers them without advancing records.
    let mut pending_executions = Vec::new();
    let mut executed_unblocks: BTreeSet<String> = BTreeSet::new();
    let mut executed_cat_off: BTreeSet<String> = BTreeSet::new();
    let mut executed_svc_off: BTreeSet<String> = BTreeSet::new();
    if !panic {
        let mut due: Vec<&PendingAction> = pending
            .iter()
            .filter(|a| a.execute_at <= now)
            .collect();
        due.sort_by(|a, b| a.execute_at.cmp(&b.execute_at).then(a.id.cmp(&b.id)));

        for action in due {
            let reblock_expected = match action.target.kind {
                TargetKind::Domain => desired_block.contains(&action.target.id),
                TargetKind::Category => desired_categories_on.contains(&action.target.id),
                TargetKind::Service => desired_services_on.contains(&action.target.id),
            };
            match action.target.kind {
                TargetKind::Domain => {
                    executed_unblocks.insert(action.target.id.clone());
                }
                TargetKind::Category => {
                    executed_cat_off.insert(action.target.id.clone());
                }
                TargetKind::Service => {
                    executed_svc_off.insert(action.target.id.clone());
                }
            }
            pending_executions.push(PendingExecution {
                action_id: action.id.clone(),
                target: action.target.clone(),
                reblock_expected,
            });
        }
    }

    // Diff against remote, lexical order within each kind. Conflicted
    // domains are excluded from every diff: they are not mutated in
    // either direction this tick.
    let mut deny_remove: BTreeSet<String> = remote
        .denylist
        .iter()
        .filter(|d| !desired_block.contains(*d) && !conflicts.contains(*d))
        .cloned()
        .collect();
    for unblocked in &executed_unblocks {
        if remote.denylist.contains(unblocked) {
            deny_remove.insert(unblocked.clone());
        }
    }

    let deny_add_wanted: Vec<String> = desired_block
        .iter()
        .filter(|d| !remote.denylist.contains(*d) && !executed_unblocks.contains(*d))
        .cloned()
        .collect();
    let (deny_add, suppressed_by_pause) = if paused && !panic {
        (Vec::new(), deny_add_wanted)
    } else {
        (deny_add_wanted, Vec::new())
    };

    // Panic leaves the allowlist untouched: additions are skipped and
    // existing entries are not torn down.
    let (allow_remove, allow_add) = if panic {
        (Vec::new(), Vec::new())
    } else {
        let remove: Vec<String> = remote
            .allowlist
            .iter()
            .filter(|d| !desired_allow.contains(*d) && !conflicts.contains(*d))
            .cloned()
            .collect();
        let add: Vec<String> = desired_allow
            .iter()
            .filter(|d| !remote.allowlist.contains(*d))
            .cloned()
            .collect();
        (remove, add)
    };

    let pc_on = |desired: &BTreeSet<String>, active: &BTreeSet<String>| -> Vec<String> {
        desired
            .iter()
            .filter(|id| !active.contains(*id))
            .cloned()
            .collect()
    };
    let pc_off = |desired: &BTreeSet<String>,
                  active: &BTreeSet<String>,
                  executed: &BTreeSet<String>|
     -> Vec<String> {
        desired
            .iter()
            .chain(executed.iter())
            .filter(|id| active.contains(*id))
            .cloned()
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect()
    };

    let mut categories_on = pc_on(&desired_categories_on, &remote.active_categories);
    let categories_off = pc_off(
        &desired_categories_off,
        &remote.active_categories,
        &executed_cat_off,
    );
    let mut services_on = pc_on(&desired_services_on, &remote.active_services);
    let services_off = pc_off(
        &desired_services_off,
        &remote.active_services,
        &executed_svc_off,
    );

    // Pause also holds back parental-control activations; they newly
    // block a whole category of domains.
    if paused && !panic {
        categories_on.clear();
        services_on.clear();
    }

    // An unblock executed this tick must not be re-activated this tick.
    categories_on.retain(|id| !executed_cat_off.contains(id));
    services_on.retain(|id| !executed_svc_off.contains(id));

    TickPlan {
        deny_remove: deny_remove.into_iter().collect(),
        deny_add,
        allow_remove,
        allow_add,
        categories_on,
        categories_off,
        services_on,
        services_off,
        conflicts: conflicts.into_iter().collect(),
        pending_executions,
        suppressed_by_pause,
    }
}
