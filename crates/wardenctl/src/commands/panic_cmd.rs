//! `panic`: emergency lockdown with no early exit.

use crate::commands::Ctx;
use crate::notify::LogSink;
use anyhow::Result;
use chrono::Utc;
use warden_core::audit::{Actor, AuditVerb};
use warden_core::duration::parse_duration;
use warden_core::events::{Event, EventSink};

pub async fn start(ctx: &Ctx, duration: &str) -> Result<()> {
    let now = Utc::now();
    let duration = parse_duration(duration)?;
    let until = ctx.overrides().begin_panic(duration, now)?;

    ctx.audit(Actor::User).record(
        AuditVerb::PanicStart,
        "lockdown",
        &[("until", until.to_rfc3339())],
    );
    LogSink.emit(&Event::PanicStarted { until });

    println!("Panic lockdown active until {until}.");
    println!("Everything in policy is blocked. There is no early exit;");
    println!("'panic extend' can only push the end further out.");
    Ok(())
}

pub async fn extend(ctx: &Ctx, duration: &str) -> Result<()> {
    let now = Utc::now();
    let delta = parse_duration(duration)?;
    let until = ctx.overrides().extend_panic(delta, now)?;

    ctx.audit(Actor::User).record(
        AuditVerb::PanicExtend,
        "lockdown",
        &[("until", until.to_rfc3339())],
    );
    LogSink.emit(&Event::PanicExtended { until });
    println!("Panic lockdown extended until {until}.");
    Ok(())
}

pub async fn status(ctx: &Ctx) -> Result<()> {
    let now = Utc::now();
    let (overrides, _) = ctx.overrides().load(now)?;
    match overrides.panic_until {
        Some(until) => {
            let remaining = until - now;
            println!(
                "Panic lockdown active until {until} ({}m remaining).",
                remaining.num_minutes()
            );
        }
        None => println!("Panic lockdown is not active."),
    }
    Ok(())
}
