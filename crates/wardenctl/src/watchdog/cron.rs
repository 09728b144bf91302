//! Crontab fallback for WSL and systemd-less hosts.
//!
//! Cron cannot go below one-minute granularity, so the 120 s tick
//! becomes `*/2 * * * *` and the heal task `*/5 * * * *`. Entries are
//! tagged with a marker comment so uninstall only touches our lines.

use super::Scheduler;
use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::process::{Command, Stdio};
use std::io::Write;
use tracing::info;

const MARKER: &str = "# warden-watchdog";

pub struct CronScheduler;

fn current_crontab() -> Result<String> {
    let output = Command::new("crontab")
        .arg("-l")
        .output()
        .context("failed to run crontab -l")?;
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        // "no crontab for user" is a normal empty start.
        Ok(String::new())
    }
}

fn write_crontab(contents: &str) -> Result<()> {
    let mut child = Command::new("crontab")
        .arg("-")
        .stdin(Stdio::piped())
        .spawn()
        .context("failed to spawn crontab -")?;
    child
        .stdin
        .as_mut()
        .ok_or_else(|| anyhow!("crontab stdin unavailable"))?
        .write_all(contents.as_bytes())?;
    let status = child.wait()?;
    if !status.success() {
        return Err(anyhow!("crontab - exited with {status}"));
    }
    Ok(())
}

fn without_our_lines(crontab: &str) -> String {
    crontab
        .lines()
        .filter(|line| !line.contains(MARKER))
        .collect::<Vec<_>>()
        .join("\n")
}

fn our_lines(exe: &Path) -> String {
    let exe = exe.display();
    format!(
        "*/2 * * * * {exe} sync --scheduled {MARKER}\n\
         */5 * * * * {exe} watchdog heal {MARKER}\n"
    )
}

impl Scheduler for CronScheduler {
    fn install(&self, exe: &Path) -> Result<()> {
        let existing = without_our_lines(&current_crontab()?);
        let mut next = existing.trim_end().to_string();
        if !next.is_empty() {
            next.push('\n');
        }
        next.push_str(&our_lines(exe));
        write_crontab(&next)?;
        info!("installed crontab entries (tick */2, heal */5)");
        Ok(())
    }

    fn uninstall(&self) -> Result<()> {
        let remaining = without_our_lines(&current_crontab()?);
        let mut contents = remaining.trim_end().to_string();
        if !contents.is_empty() {
            contents.push('\n');
        }
        write_crontab(&contents)?;
        info!("removed crontab entries");
        Ok(())
    }

    fn is_installed(&self) -> Result<bool> {
        Ok(current_crontab()?
            .lines()
            .any(|line| line.contains(MARKER) && line.contains("sync")))
    }

    fn label(&self) -> &'static str {
        "crontab"
    }
}
