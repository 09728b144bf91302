//! Operator status view: overrides, pending queue, PIN gate, watchdog
//! registration and the last tick summary.

use crate::commands::{sync, Ctx};
use crate::watchdog::{self, DisableState};
use anyhow::Result;
use chrono::Utc;
use owo_colors::OwoColorize;

pub async fn run(ctx: &Ctx) -> Result<()> {
    let now = Utc::now();
    println!();
    println!("{}", "  warden status".bold());
    println!("  ------------------------------------------------------------");

    let (overrides, _) = ctx.overrides().load(now)?;
    match overrides.panic_until {
        Some(until) => println!("  {} panic lockdown until {until}", "[!]".red()),
        None => println!("  {} panic: inactive", "[*]".green()),
    }
    match overrides.pause_until {
        Some(until) => println!("  {} paused until {until}", "[!]".yellow()),
        None => println!("  {} pause: inactive", "[*]".green()),
    }

    let pending = ctx.pending().list(false, now)?;
    if pending.is_empty() {
        println!("  {} no pending unblocks", "[*]".green());
    } else {
        println!("  {} {} pending unblock(s):", "[~]".yellow(), pending.len());
        for action in &pending {
            println!(
                "      {}  {}  executes {}",
                action.id,
                action.target,
                action.execute_at.format("%Y-%m-%d %H:%M UTC")
            );
        }
    }

    let pin = ctx.pin();
    if pin.is_enabled() {
        match pin.session_remaining(now)? {
            Some(remaining) => println!(
                "  {} PIN gate active, session open for {}m",
                "[*]".green(),
                remaining.num_minutes()
            ),
            None => println!("  {} PIN gate active, no open session", "[*]".green()),
        }
        if let Some(until) = pin.lockout_until(now)? {
            println!("  {} PIN locked out until {until}", "[!]".red());
        }
        if let Some(request) = ctx.unlock().pin_removal(now)? {
            println!(
                "  {} PIN removal pending, executes {}",
                "[~]".yellow(),
                request.execute_at.format("%Y-%m-%d %H:%M UTC")
            );
        }
    } else {
        println!("  {} PIN gate not configured", "[ ]".dimmed());
    }

    match watchdog::disable_state(&ctx.data_dir, now)? {
        DisableState::Enabled => {
            let scheduler = watchdog::scheduler_for(watchdog::detect_platform());
            match scheduler.is_installed() {
                Ok(true) => println!(
                    "  {} watchdog registered ({})",
                    "[*]".green(),
                    scheduler.label()
                ),
                Ok(false) => println!(
                    "  {} watchdog not registered (run 'watchdog install')",
                    "[!]".yellow()
                ),
                Err(e) => println!("  {} watchdog status unknown: {e}", "[?]".yellow()),
            }
        }
        DisableState::DisabledUntil(until) => {
            println!("  {} watchdog disabled until {until}", "[!]".yellow())
        }
        DisableState::DisabledPermanently => {
            println!("  {} watchdog disabled permanently", "[!]".red())
        }
    }

    match sync::last_summary(ctx) {
        Some(summary) => {
            let at = summary
                .at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!(
                "  {} last tick {at}: {} mutation(s), {} pending, {} error(s), {}ms",
                if summary.errors == 0 {
                    "[*]".green().to_string()
                } else {
                    "[!]".red().to_string()
                },
                summary.mutations(),
                summary.pending_executed,
                summary.errors,
                summary.duration_ms
            );
            for cause in summary.error_causes.iter().take(5) {
                println!("      {}", cause.dimmed());
            }
        }
        None => println!("  {} no tick has run yet", "[ ]".dimmed()),
    }

    println!();
    Ok(())
}
