//! `pending list|show|cancel`.

use crate::commands::Ctx;
use crate::notify::LogSink;
use anyhow::Result;
use chrono::Utc;
use warden_core::audit::{Actor, AuditVerb};
use warden_core::events::{Event, EventSink};
use warden_core::pending::PendingStatus;

pub async fn list(ctx: &Ctx, all: bool) -> Result<()> {
    let now = Utc::now();
    let actions = ctx.pending().list(all, now)?;
    if actions.is_empty() {
        println!("No pending actions.");
        return Ok(());
    }

    for action in actions {
        let state = match action.status {
            PendingStatus::Pending => format!(
                "executes {}",
                action.execute_at.format("%Y-%m-%d %H:%M UTC")
            ),
            PendingStatus::Executed => format!(
                "executed{}",
                action
                    .outcome
                    .as_deref()
                    .map(|o| format!(" ({o})"))
                    .unwrap_or_default()
            ),
            PendingStatus::Cancelled => "cancelled".to_string(),
        };
        println!("{}  {}  delay={}  {state}", action.id, action.target, action.delay);
    }
    Ok(())
}

pub async fn show(ctx: &Ctx, id: &str) -> Result<()> {
    let now = Utc::now();
    match ctx.pending().get(id, now)? {
        Some(action) => {
            println!("id:           {}", action.id);
            println!("target:       {}", action.target);
            println!("delay:        {}", action.delay);
            println!("status:       {:?}", action.status);
            println!("requested by: {}", action.requested_by);
            println!("created:      {}", action.created_at.to_rfc3339());
            println!("executes:     {}", action.execute_at.to_rfc3339());
            if let Some(resolved) = action.resolved_at {
                println!("resolved:     {}", resolved.to_rfc3339());
            }
            if let Some(outcome) = &action.outcome {
                println!("outcome:      {outcome}");
            }
        }
        None => println!("No action with id {id}."),
    }
    Ok(())
}

pub async fn cancel(ctx: &Ctx, id: &str) -> Result<()> {
    let now = Utc::now();
    match ctx.pending().cancel(id, now)? {
        Some(action) => {
            ctx.audit(Actor::User).record(
                AuditVerb::PendingCancel,
                &action.target.to_string(),
                &[("id", action.id.clone())],
            );
            LogSink.emit(&Event::PendingCancelled {
                id: action.id.clone(),
                target: action.target.to_string(),
            });
            println!("Cancelled {} ({}).", action.id, action.target);
        }
        None => println!("No cancellable action with id {id}."),
    }
    Ok(())
}
