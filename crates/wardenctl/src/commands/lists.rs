//! `unblock`, `allow`, `disallow`: operator-driven list mutations.
//!
//! `unblock` honors the domain's configured friction delay: instant
//! for "0", a pending action for positive delays, refused outright for
//! locked/"never" entries.

use crate::commands::Ctx;
use crate::notify::LogSink;
use anyhow::Result;
use chrono::Utc;
use warden_core::audit::{Actor, AuditVerb};
use warden_core::domain;
use warden_core::duration::Delay;
use warden_core::error::WardenError;
use warden_core::events::{Event, EventSink};
use warden_core::pending::{CreateOutcome, Target};
use warden_nextdns::DnsBackend;

pub async fn unblock(ctx: &Ctx, domain_name: &str) -> Result<()> {
    let now = Utc::now();
    let name = domain::normalize(domain_name);
    if !domain::validate_domain(&name) {
        return Err(WardenError::Validation(format!("invalid domain '{domain_name}'")).into());
    }

    let (overrides, _) = ctx.overrides().load(now)?;
    overrides.refuse_during_panic("unblock")?;
    ctx.pin().require_session("unblock", now)?;

    let policy = ctx.load_policy()?;
    if policy.domain_locked(&name) {
        return Err(WardenError::Permission(format!(
            "'{name}' is protected and cannot be unblocked"
        ))
        .into());
    }

    let delay = policy.delay_for(&name).unwrap_or(Delay::Instant);
    let audit = ctx.audit(Actor::User);

    match ctx.pending().create(Target::domain(&name), &delay, now, "cli")? {
        CreateOutcome::Immediate => {
            let client = ctx.client()?;
            client.remove_deny(&name).await?;
            audit.record(AuditVerb::Unblock, &name, &[("delay", "0".into())]);
            LogSink.emit(&Event::DomainUnblocked {
                domain: name.clone(),
            });
            println!("Unblocked {name}.");
        }
        CreateOutcome::Created(action) => {
            audit.record(
                AuditVerb::PendingCreate,
                &name,
                &[("id", action.id.clone()), ("delay", action.delay.clone())],
            );
            LogSink.emit(&Event::PendingCreated {
                id: action.id.clone(),
                target: name.clone(),
                execute_at: action.execute_at,
            });
            println!(
                "Unblock of {name} queued as {} (delay {}), executes {}.",
                action.id,
                action.delay,
                action.execute_at.format("%Y-%m-%d %H:%M UTC")
            );
        }
        CreateOutcome::Existing(action) => {
            println!(
                "An unblock for {name} is already queued as {} (executes {}).",
                action.id,
                action.execute_at.format("%Y-%m-%d %H:%M UTC")
            );
        }
    }
    Ok(())
}

pub async fn allow(ctx: &Ctx, domain_name: &str) -> Result<()> {
    let now = Utc::now();
    let name = domain::normalize(domain_name);
    if !domain::validate_domain(&name) {
        return Err(WardenError::Validation(format!("invalid domain '{domain_name}'")).into());
    }

    let (overrides, _) = ctx.overrides().load(now)?;
    overrides.refuse_during_panic("allow")?;
    ctx.pin().require_session("allow", now)?;

    let client = ctx.client()?;
    client.add_allow(&name).await?;
    ctx.audit(Actor::User).record(AuditVerb::Allow, &name, &[]);
    LogSink.emit(&Event::DomainAllowed {
        domain: name.clone(),
    });
    println!("Allowed {name}.");
    Ok(())
}

pub async fn disallow(ctx: &Ctx, domain_name: &str) -> Result<()> {
    let now = Utc::now();
    let name = domain::normalize(domain_name);
    if !domain::validate_domain(&name) {
        return Err(WardenError::Validation(format!("invalid domain '{domain_name}'")).into());
    }

    let (overrides, _) = ctx.overrides().load(now)?;
    overrides.refuse_during_panic("disallow")?;

    let client = ctx.client()?;
    client.remove_allow(&name).await?;
    ctx.audit(Actor::User)
        .record(AuditVerb::Disallow, &name, &[]);
    LogSink.emit(&Event::DomainDisallowed {
        domain: name.clone(),
    });
    println!("Disallowed {name}.");
    Ok(())
}
