//! `watchdog install|uninstall|status|enable|disable|heal`.

use crate::commands::Ctx;
use crate::watchdog::{self, DisableState};
use anyhow::{Context, Result};
use chrono::Utc;
use warden_core::audit::{Actor, AuditVerb};
use warden_core::duration::parse_duration;

fn current_exe() -> Result<std::path::PathBuf> {
    std::env::current_exe().context("cannot resolve own executable path")
}

pub async fn install(ctx: &Ctx) -> Result<()> {
    let platform = watchdog::detect_platform();
    let scheduler = watchdog::scheduler_for(platform);
    scheduler.install(&current_exe()?)?;
    ctx.audit(Actor::User).record(
        AuditVerb::Sync,
        "watchdog",
        &[("installed", scheduler.label().to_string())],
    );
    println!("Watchdog installed via {}.", scheduler.label());
    println!("Tick every {}s, self-heal every {}s.", watchdog::SYNC_INTERVAL_SECS, watchdog::HEAL_INTERVAL_SECS);
    Ok(())
}

pub async fn uninstall(ctx: &Ctx) -> Result<()> {
    let scheduler = watchdog::scheduler_for(watchdog::detect_platform());
    scheduler.uninstall()?;
    ctx.audit(Actor::User).record(
        AuditVerb::Sync,
        "watchdog",
        &[("uninstalled", scheduler.label().to_string())],
    );
    println!("Watchdog uninstalled.");
    Ok(())
}

pub async fn status(ctx: &Ctx) -> Result<()> {
    let scheduler = watchdog::scheduler_for(watchdog::detect_platform());
    match scheduler.is_installed() {
        Ok(true) => println!("Watchdog registered via {}.", scheduler.label()),
        Ok(false) => println!("Watchdog is not registered."),
        Err(e) => println!("Cannot query {}: {e}", scheduler.label()),
    }
    match watchdog::disable_state(&ctx.data_dir, Utc::now())? {
        DisableState::Enabled => println!("Ticks are enabled."),
        DisableState::DisabledUntil(until) => println!("Ticks disabled until {until}."),
        DisableState::DisabledPermanently => println!("Ticks disabled permanently."),
    }
    Ok(())
}

pub async fn enable(ctx: &Ctx) -> Result<()> {
    if watchdog::enable(&ctx.data_dir)? {
        println!("Watchdog ticks re-enabled.");
    } else {
        println!("Watchdog was not disabled.");
    }
    Ok(())
}

pub async fn disable(ctx: &Ctx, duration: Option<&str>, permanent: bool) -> Result<()> {
    let now = Utc::now();
    let state = if permanent {
        watchdog::disable(&ctx.data_dir, None, now)?
    } else {
        let duration = duration.context("a duration (or --permanent) is required")?;
        watchdog::disable(&ctx.data_dir, Some(parse_duration(duration)?), now)?
    };
    match state {
        DisableState::DisabledUntil(until) => println!("Watchdog ticks disabled until {until}."),
        DisableState::DisabledPermanently => {
            println!("Watchdog ticks disabled until 'watchdog enable'.")
        }
        DisableState::Enabled => {}
    }
    Ok(())
}

/// The 300-second task: re-register the tick if the platform lost it.
pub async fn heal(ctx: &Ctx) -> Result<()> {
    let scheduler = watchdog::scheduler_for(watchdog::detect_platform());
    if scheduler.is_installed()? {
        return Ok(());
    }

    tracing::warn!("watchdog registration missing; reinstalling");
    scheduler.install(&current_exe()?)?;
    ctx.audit(Actor::Watchdog).record(
        AuditVerb::Sync,
        "watchdog",
        &[("healed", scheduler.label().to_string())],
    );
    println!("Watchdog registration was missing and has been reinstalled.");
    Ok(())
}
