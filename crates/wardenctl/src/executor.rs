//! Applies a tick plan against the remote backend.
//!
//! Deterministic order: denylist removals, denylist additions,
//! allowlist removals, allowlist additions, then native parental-
//! control toggles; lexical within each kind. A per-item failure is
//! logged and counted but never aborts the tick; the next tick retries
//! naturally.

use std::collections::BTreeSet;
use std::time::Instant;
use warden_core::audit::{AuditLog, AuditVerb};
use warden_core::events::{Event, EventSink, TickSummary};
use warden_core::reconcile::TickPlan;
use warden_nextdns::DnsBackend;

/// Mutations that failed this tick, by kind.
#[derive(Debug, Default)]
pub struct Failures {
    pub deny_remove: BTreeSet<String>,
    pub deny_add: BTreeSet<String>,
    pub allow_remove: BTreeSet<String>,
    pub allow_add: BTreeSet<String>,
    pub categories: BTreeSet<String>,
    pub services: BTreeSet<String>,
}

impl Failures {
    pub fn total(&self) -> usize {
        self.deny_remove.len()
            + self.deny_add.len()
            + self.allow_remove.len()
            + self.allow_add.len()
            + self.categories.len()
            + self.services.len()
    }
}

pub struct ApplyOutcome {
    pub summary: TickSummary,
    pub failures: Failures,
}

/// Apply `plan` item by item. See module docs for ordering and error
/// isolation.
pub async fn apply_plan(
    backend: &dyn DnsBackend,
    plan: &TickPlan,
    audit: &AuditLog,
    sink: &dyn EventSink,
) -> ApplyOutcome {
    let started = Instant::now();
    let mut summary = TickSummary::default();
    let mut failures = Failures::default();

    for domain in &plan.deny_remove {
        match backend.remove_deny(domain).await {
            Ok(()) => {
                summary.unblocked += 1;
                audit.record(AuditVerb::Unblock, domain, &[]);
                sink.emit(&Event::DomainUnblocked {
                    domain: domain.clone(),
                });
            }
            Err(e) => {
                record_failure(&mut summary, &format!("unblock {domain}: {e}"));
                failures.deny_remove.insert(domain.clone());
            }
        }
    }

    for domain in &plan.deny_add {
        match backend.add_deny(domain).await {
            Ok(()) => {
                summary.blocked += 1;
                audit.record(AuditVerb::Block, domain, &[]);
                sink.emit(&Event::DomainBlocked {
                    domain: domain.clone(),
                });
            }
            Err(e) => {
                record_failure(&mut summary, &format!("block {domain}: {e}"));
                failures.deny_add.insert(domain.clone());
            }
        }
    }

    for domain in &plan.allow_remove {
        match backend.remove_allow(domain).await {
            Ok(()) => {
                summary.disallowed += 1;
                audit.record(AuditVerb::Disallow, domain, &[]);
                sink.emit(&Event::DomainDisallowed {
                    domain: domain.clone(),
                });
            }
            Err(e) => {
                record_failure(&mut summary, &format!("disallow {domain}: {e}"));
                failures.allow_remove.insert(domain.clone());
            }
        }
    }

    for domain in &plan.allow_add {
        match backend.add_allow(domain).await {
            Ok(()) => {
                summary.allowed += 1;
                audit.record(AuditVerb::Allow, domain, &[]);
                sink.emit(&Event::DomainAllowed {
                    domain: domain.clone(),
                });
            }
            Err(e) => {
                record_failure(&mut summary, &format!("allow {domain}: {e}"));
                failures.allow_add.insert(domain.clone());
            }
        }
    }

    for id in &plan.categories_off {
        match backend.set_category(id, false).await {
            Ok(()) => {
                summary.pc_deactivated += 1;
                audit.record(AuditVerb::PcDeactivate, &format!("category:{id}"), &[]);
                sink.emit(&Event::CategoryDeactivated { id: id.clone() });
            }
            Err(e) => {
                record_failure(&mut summary, &format!("category {id} off: {e}"));
                failures.categories.insert(id.clone());
            }
        }
    }

    for id in &plan.categories_on {
        match backend.set_category(id, true).await {
            Ok(()) => {
                summary.pc_activated += 1;
                audit.record(AuditVerb::PcActivate, &format!("category:{id}"), &[]);
                sink.emit(&Event::CategoryActivated { id: id.clone() });
            }
            Err(e) => {
                record_failure(&mut summary, &format!("category {id} on: {e}"));
                failures.categories.insert(id.clone());
            }
        }
    }

    for id in &plan.services_off {
        match backend.set_service(id, false).await {
            Ok(()) => {
                summary.pc_deactivated += 1;
                audit.record(AuditVerb::PcDeactivate, &format!("service:{id}"), &[]);
                sink.emit(&Event::ServiceDeactivated { id: id.clone() });
            }
            Err(e) => {
                record_failure(&mut summary, &format!("service {id} off: {e}"));
                failures.services.insert(id.clone());
            }
        }
    }

    for id in &plan.services_on {
        match backend.set_service(id, true).await {
            Ok(()) => {
                summary.pc_activated += 1;
                audit.record(AuditVerb::PcActivate, &format!("service:{id}"), &[]);
                sink.emit(&Event::ServiceActivated { id: id.clone() });
            }
            Err(e) => {
                record_failure(&mut summary, &format!("service {id} on: {e}"));
                failures.services.insert(id.clone());
            }
        }
    }

    summary.duration_ms = started.elapsed().as_millis() as u64;
    ApplyOutcome { summary, failures }
}

fn record_failure(summary: &mut TickSummary, cause: &str) {
    tracing::warn!("{cause}");
    summary.errors += 1;
    summary.error_causes.push(cause.to_string());
}

/// Render the plan for `sync --dry-run`.
pub fn render_plan(plan: &TickPlan) -> String {
    let mut out = String::new();
    let mut section = |title: &str, items: &[String]| {
        if !items.is_empty() {
            out.push_str(&format!("{title}:\n"));
            for item in items {
                out.push_str(&format!("  {item}\n"));
            }
        }
    };

    section("remove from denylist", &plan.deny_remove);
    section("add to denylist", &plan.deny_add);
    section("remove from allowlist", &plan.allow_remove);
    section("add to allowlist", &plan.allow_add);
    section("deactivate categories", &plan.categories_off);
    section("activate categories", &plan.categories_on);
    section("deactivate services", &plan.services_off);
    section("activate services", &plan.services_on);
    section("suppressed by pause", &plan.suppressed_by_pause);
    section("skipped (policy conflict)", &plan.conflicts);

    if !plan.pending_executions.is_empty() {
        out.push_str("pending executions:\n");
        for execution in &plan.pending_executions {
            let note = if execution.reblock_expected {
                " (schedule will re-block next tick)"
            } else {
                ""
            };
            out.push_str(&format!(
                "  {} -> {}{note}\n",
                execution.action_id, execution.target
            ));
        }
    }

    if out.is_empty() {
        out.push_str("nothing to do\n");
    }
    out
}
