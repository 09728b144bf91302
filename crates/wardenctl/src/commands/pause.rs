//! `pause` and `resume`: hold back new blocks for a while.

use crate::commands::Ctx;
use crate::notify::LogSink;
use anyhow::Result;
use chrono::{Duration, Utc};
use warden_core::audit::{Actor, AuditVerb};
use warden_core::events::{Event, EventSink};
use warden_core::overrides::DEFAULT_PAUSE_MINUTES;

pub async fn pause(ctx: &Ctx, minutes: Option<u32>) -> Result<()> {
    let now = Utc::now();
    let store = ctx.overrides();
    let (overrides, _) = store.load(now)?;
    overrides.refuse_during_panic("pause")?;
    ctx.pin().require_session("pause", now)?;

    let minutes = minutes.map(i64::from).unwrap_or(DEFAULT_PAUSE_MINUTES);
    if minutes <= 0 {
        anyhow::bail!("pause duration must be positive");
    }

    let until = store.begin_pause(Duration::minutes(minutes), now)?;
    ctx.audit(Actor::User).record(
        AuditVerb::Pause,
        "blocking",
        &[("minutes", minutes.to_string())],
    );
    LogSink.emit(&Event::Paused { until });
    println!("Blocking paused until {until} ({minutes} minutes).");
    println!("Already-blocked domains stay blocked; unblocks still apply.");
    Ok(())
}

pub async fn resume(ctx: &Ctx) -> Result<()> {
    let now = Utc::now();
    let store = ctx.overrides();
    let (overrides, _) = store.load(now)?;
    overrides.refuse_during_panic("resume")?;

    if store.end_pause(now)? {
        ctx.audit(Actor::User).record(AuditVerb::Resume, "blocking", &[]);
        LogSink.emit(&Event::Resumed);
        println!("Blocking resumed.");
    } else {
        println!("No pause was active.");
    }
    Ok(())
}
