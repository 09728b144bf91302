//! The reconciler tick.
//!
//! Load snapshots, compute the plan, apply it in order, transition
//! pending records, garbage-collect, and leave a summary behind for
//! `status`. Single-flight per machine through the run token.

use crate::commands::Ctx;
use crate::executor::{apply_plan, render_plan};
use crate::notify::LogSink;
use crate::runlock::{self, Acquire};
use crate::watchdog::{self, DisableState};
use anyhow::Result;
use chrono::Utc;
use std::time::Instant;
use tracing::{info, warn};
use warden_core::audit::{Actor, AuditVerb};
use warden_core::events::{Event, EventSink, TickSummary};
use warden_core::pending::TargetKind;
use warden_core::reconcile::compute_plan;
use warden_core::state;
use warden_nextdns::types::GlobalFlags;
use warden_nextdns::DnsBackend;

pub async fn run(ctx: &Ctx, dry_run: bool, verbose: bool, scheduled: bool) -> Result<()> {
    let started = Instant::now();
    let now = Utc::now();
    let actor = if scheduled {
        Actor::Watchdog
    } else {
        Actor::User
    };
    let audit = ctx.audit(actor);

    if scheduled {
        if let DisableState::DisabledUntil(_) | DisableState::DisabledPermanently =
            watchdog::disable_state(&ctx.data_dir, now)?
        {
            info!("watchdog is disabled; skipping scheduled tick");
            return Ok(());
        }
    }

    // Single-flight: a concurrent tick wins, we leave quietly.
    let _token = match runlock::acquire(&ctx.data_dir)? {
        Acquire::Held(token) => token,
        Acquire::Busy => {
            audit.record(AuditVerb::Sync, "tick", &[("skipped", "already-running".into())]);
            info!("another tick is already running; nothing to do");
            return Ok(());
        }
    };

    let policy = ctx.load_policy()?;
    for warning in &policy.warnings {
        warn!("{warning}");
    }

    let override_store = ctx.overrides();
    let (overrides, panic_expired) = override_store.load(now)?;
    if panic_expired {
        audit.record(AuditVerb::PanicEnd, "panic", &[]);
    }

    let pending_store = ctx.pending();
    let pending = pending_store.list(false, now)?;

    let client = ctx.client()?;
    let remote = client.snapshot().await?;
    let plan = compute_plan(&policy, &overrides, &pending, &remote, now);

    if verbose {
        for domain in &plan.suppressed_by_pause {
            info!("pause active: holding back block of {domain}");
        }
        for domain in &plan.conflicts {
            warn!("policy conflict: {domain} skipped this tick");
        }
    }

    if dry_run {
        print!("{}", render_plan(&plan));
        pending_store.gc(now)?;
        let summary = TickSummary {
            at: Some(now),
            duration_ms: started.elapsed().as_millis() as u64,
            dry_run: true,
            ..Default::default()
        };
        persist_summary(ctx, &summary)?;
        return Ok(());
    }

    let sink = LogSink;
    let outcome = apply_plan(&client, &plan, &audit, &sink).await;
    let mut summary = outcome.summary;

    // Transition pending records whose unblock went through.
    for execution in &plan.pending_executions {
        let failed = match execution.target.kind {
            TargetKind::Domain => outcome.failures.deny_remove.contains(&execution.target.id),
            TargetKind::Category => outcome.failures.categories.contains(&execution.target.id),
            TargetKind::Service => outcome.failures.services.contains(&execution.target.id),
        };
        if failed {
            warn!(
                "pending action {} not executed: unblock of {} failed",
                execution.action_id, execution.target
            );
            continue;
        }

        let outcome_note = if execution.reblock_expected {
            "unblocked (re-block expected next tick)"
        } else {
            "unblocked"
        };
        if pending_store.mark_executed(&execution.action_id, outcome_note, now)? {
            summary.pending_executed += 1;
            audit.record(
                AuditVerb::PendingExecute,
                &execution.target.to_string(),
                &[("id", execution.action_id.clone())],
            );
            sink.emit(&Event::PendingExecuted {
                id: execution.action_id.clone(),
                target: execution.target.to_string(),
                reblock_expected: execution.reblock_expected,
            });
        }
    }

    // Push the three global parental-control flags when configured.
    if let Some(nextdns) = &policy.policy.nextdns {
        if let Some(flags) = &nextdns.settings {
            let current = client.get_parental_control().await;
            let needs_update = match &current {
                Ok(pc) => {
                    pc.safe_search != flags.safe_search
                        || pc.youtube_restricted_mode != flags.youtube_restricted_mode
                        || pc.block_bypass != flags.block_bypass
                }
                Err(_) => true,
            };
            if needs_update {
                let update = GlobalFlags {
                    safe_search: flags.safe_search,
                    youtube_restricted_mode: flags.youtube_restricted_mode,
                    block_bypass: flags.block_bypass,
                };
                if let Err(e) = client.update_parental_control_global(&update).await {
                    warn!("failed to update parental-control settings: {e}");
                    summary.errors += 1;
                    summary.error_causes.push(format!("parental-control settings: {e}"));
                }
            }
        }
    }

    pending_store.gc(now)?;

    summary.at = Some(now);
    summary.duration_ms = started.elapsed().as_millis() as u64;
    persist_summary(ctx, &summary)?;

    audit.record(
        AuditVerb::Sync,
        "tick",
        &[
            ("blocked", summary.blocked.to_string()),
            ("unblocked", summary.unblocked.to_string()),
            ("allowed", summary.allowed.to_string()),
            ("disallowed", summary.disallowed.to_string()),
            ("pc_on", summary.pc_activated.to_string()),
            ("pc_off", summary.pc_deactivated.to_string()),
            ("pending", summary.pending_executed.to_string()),
            ("errors", summary.errors.to_string()),
            ("ms", summary.duration_ms.to_string()),
        ],
    );
    sink.emit(&Event::TickCompleted {
        summary: summary.clone(),
    });

    Ok(())
}

fn persist_summary(ctx: &Ctx, summary: &TickSummary) -> Result<()> {
    let json = serde_json::to_vec_pretty(summary)?;
    state::write_atomic(&ctx.last_sync_path(), &json)?;
    Ok(())
}

/// Load the last persisted tick summary for `status`.
pub fn last_summary(ctx: &Ctx) -> Option<TickSummary> {
    let raw = std::fs::read_to_string(ctx.last_sync_path()).ok()?;
    serde_json::from_str(&raw).ok()
}
