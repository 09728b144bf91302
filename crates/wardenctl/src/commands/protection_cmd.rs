//! `protection pin ...` and locked-item unlock requests.

use crate::commands::Ctx;
use anyhow::Result;
use chrono::Utc;
use std::io::{BufRead, Write};
use warden_core::audit::{Actor, AuditVerb};
use warden_core::error::WardenError;
use warden_core::pin::{VerifyOutcome, PIN_REMOVAL_DELAY_HOURS};
use warden_core::policy::is_locked;
use warden_core::unlock::UnlockKind;

fn prompt_pin(prompt: &str) -> Result<String> {
    print!("{prompt}: ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

pub async fn pin_set(ctx: &Ctx) -> Result<()> {
    let gate = ctx.pin();
    let now = Utc::now();

    if gate.is_enabled() {
        // Changing the PIN requires knowing the old one.
        let current = prompt_pin("Current PIN")?;
        match gate.verify(&current, now)? {
            VerifyOutcome::Verified { .. } => {}
            VerifyOutcome::Incorrect { .. } => {
                return Err(WardenError::Permission("incorrect PIN".to_string()).into())
            }
            VerifyOutcome::LockedOut { until } => {
                return Err(
                    WardenError::Permission(format!("PIN locked out until {until}")).into(),
                )
            }
        }
    }

    let pin = prompt_pin("New PIN (4-32 characters)")?;
    let confirm = prompt_pin("Repeat new PIN")?;
    if pin != confirm {
        return Err(WardenError::Validation("PINs do not match".to_string()).into());
    }

    gate.set(&pin)?;
    ctx.audit(Actor::User).record(AuditVerb::PinSet, "protection", &[]);
    println!("PIN protection enabled.");
    Ok(())
}

pub async fn pin_status(ctx: &Ctx) -> Result<()> {
    let gate = ctx.pin();
    let now = Utc::now();

    if !gate.is_enabled() {
        println!("PIN protection is not configured.");
        return Ok(());
    }

    println!("PIN protection is enabled.");
    match gate.session_remaining(now)? {
        Some(remaining) => println!(
            "Session open for another {}m {}s.",
            remaining.num_minutes(),
            remaining.num_seconds() % 60
        ),
        None => println!("No open session."),
    }
    if let Some(until) = gate.lockout_until(now)? {
        println!("Locked out until {until}.");
    } else {
        let failures = gate.failed_attempts(now)?;
        if failures > 0 {
            println!("{failures} failed attempt(s) in the current window.");
        }
    }
    if let Some(request) = ctx.unlock().pin_removal(now)? {
        println!(
            "Removal pending ({}), executes {}.",
            request.id,
            request.execute_at.format("%Y-%m-%d %H:%M UTC")
        );
    }
    Ok(())
}

pub async fn pin_verify(ctx: &Ctx) -> Result<()> {
    let gate = ctx.pin();
    let now = Utc::now();
    let audit = ctx.audit(Actor::User);

    if !gate.is_enabled() {
        println!("PIN protection is not configured.");
        return Ok(());
    }

    let pin = prompt_pin("PIN")?;
    match gate.verify(&pin, now)? {
        VerifyOutcome::Verified { session_until } => {
            audit.record(AuditVerb::PinVerified, "protection", &[]);
            println!("Verified. Session open until {session_until}.");
            Ok(())
        }
        VerifyOutcome::Incorrect { failures } => {
            audit.record(
                AuditVerb::PinFailed,
                "protection",
                &[("failures", failures.to_string())],
            );
            Err(WardenError::Permission(format!(
                "incorrect PIN ({failures} recent failure(s))"
            ))
            .into())
        }
        VerifyOutcome::LockedOut { until } => {
            audit.record(AuditVerb::PinLockedOut, "protection", &[]);
            Err(WardenError::Permission(format!("PIN locked out until {until}")).into())
        }
    }
}

pub async fn pin_remove(ctx: &Ctx) -> Result<()> {
    let gate = ctx.pin();
    let now = Utc::now();

    if !gate.is_enabled() {
        println!("PIN protection is not configured.");
        return Ok(());
    }

    let pin = prompt_pin("PIN")?;
    match gate.verify(&pin, now)? {
        VerifyOutcome::Verified { .. } => {}
        VerifyOutcome::Incorrect { .. } => {
            return Err(WardenError::Permission("incorrect PIN".to_string()).into())
        }
        VerifyOutcome::LockedOut { until } => {
            return Err(WardenError::Permission(format!("PIN locked out until {until}")).into())
        }
    }

    let request = ctx.unlock().create(
        UnlockKind::Pin,
        "protection",
        PIN_REMOVAL_DELAY_HOURS,
        Some("PIN removal requested".to_string()),
        now,
    )?;
    ctx.audit(Actor::User).record(
        AuditVerb::UnlockRequest,
        "pin:protection",
        &[("id", request.id.clone())],
    );
    println!(
        "PIN removal queued as {}, executes {}.",
        request.id,
        request.execute_at.format("%Y-%m-%d %H:%M UTC")
    );
    println!("The PIN stays active until then; cancel with 'protection unlock-cancel {}'.", request.id);
    Ok(())
}

pub async fn unlock_request(
    ctx: &Ctx,
    kind: &str,
    id: &str,
    reason: Option<String>,
) -> Result<()> {
    let now = Utc::now();
    let kind = match kind {
        "category" => UnlockKind::Category,
        "service" => UnlockKind::Service,
        other => {
            return Err(WardenError::Validation(format!("unknown item kind '{other}'")).into())
        }
    };

    // Only locked items need the delayed path.
    let policy = ctx.load_policy()?;
    let nextdns = policy.policy.nextdns.clone().unwrap_or_default();
    let entry = match kind {
        UnlockKind::Category => nextdns.categories.iter().find(|c| c.id == id),
        UnlockKind::Service => nextdns.services.iter().find(|s| s.id == id),
        UnlockKind::Pin => None,
    };
    let Some(entry) = entry else {
        return Err(WardenError::Validation(format!(
            "no configured {} '{id}'",
            match kind {
                UnlockKind::Category => "category",
                _ => "service",
            }
        ))
        .into());
    };
    if !is_locked(entry.locked, entry.unblock_delay.as_deref()) {
        println!("'{id}' is not locked; edit the policy file directly.");
        return Ok(());
    }

    let request = ctx
        .unlock()
        .create(kind, id, policy.unlock_delay_hours(), reason, now)?;
    ctx.audit(Actor::User).record(
        AuditVerb::UnlockRequest,
        &format!("{}:{id}", request.kind.as_str()),
        &[("id", request.id.clone())],
    );
    println!(
        "Unlock request {} filed, executes {} ({}h delay).",
        request.id,
        request.execute_at.format("%Y-%m-%d %H:%M UTC"),
        request.delay_hours
    );
    Ok(())
}

pub async fn unlock_cancel(ctx: &Ctx, id: &str) -> Result<()> {
    let now = Utc::now();
    match ctx.unlock().cancel(id, now)? {
        Some(request) => {
            ctx.audit(Actor::User).record(
                AuditVerb::UnlockCancel,
                &format!("{}:{}", request.kind.as_str(), request.item_id),
                &[("id", request.id.clone())],
            );
            println!("Cancelled unlock request {}.", request.id);
        }
        None => println!("No unique pending unlock request matches '{id}'."),
    }
    Ok(())
}

pub async fn unlock_list(ctx: &Ctx) -> Result<()> {
    let now = Utc::now();
    let audit = ctx.audit(Actor::User);
    let store = ctx.unlock();

    // Execute matured requests on the way through, so the listing is
    // what the operator acts on.
    for request in store.executable(now)? {
        store.execute(&request.id, &ctx.policy_path(), &ctx.pin(), &audit, now)?;
        println!(
            "Executed matured unlock request {} ({}:{}).",
            request.id,
            request.kind.as_str(),
            request.item_id
        );
    }

    let pending = store.pending(now)?;
    if pending.is_empty() {
        println!("No pending unlock requests.");
        return Ok(());
    }
    for request in pending {
        println!(
            "{}  {}:{}  executes {}{}",
            request.id,
            request.kind.as_str(),
            request.item_id,
            request.execute_at.format("%Y-%m-%d %H:%M UTC"),
            request
                .reason
                .as_deref()
                .map(|r| format!("  ({r})"))
                .unwrap_or_default()
        );
    }
    Ok(())
}
