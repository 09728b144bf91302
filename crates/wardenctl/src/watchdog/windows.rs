//! Task Scheduler registration via schtasks.

use super::Scheduler;
use anyhow::{anyhow, Result};
use std::path::Path;
use std::process::Command;
use tracing::info;

const SYNC_TASK: &str = "WardenSync";
const HEAL_TASK: &str = "WardenHeal";

pub struct TaskSchedulerHandler;

fn schtasks(args: &[&str]) -> Result<std::process::Output> {
    Command::new("schtasks")
        .args(args)
        .output()
        .map_err(|e| anyhow!("failed to run schtasks: {e}"))
}

fn create_task(name: &str, command: &str, minutes: u32) -> Result<()> {
    let interval = minutes.to_string();
    let output = schtasks(&[
        "/Create", "/F", "/TN", name, "/SC", "MINUTE", "/MO", &interval, "/TR", command,
    ])?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("schtasks /Create {name} failed: {stderr}"));
    }
    Ok(())
}

impl Scheduler for TaskSchedulerHandler {
    fn install(&self, exe: &Path) -> Result<()> {
        let exe = exe.display();
        create_task(SYNC_TASK, &format!("\"{exe}\" sync --scheduled"), 2)?;
        create_task(HEAL_TASK, &format!("\"{exe}\" watchdog heal"), 5)?;
        info!("registered Task Scheduler tasks {SYNC_TASK} and {HEAL_TASK}");
        Ok(())
    }

    fn uninstall(&self) -> Result<()> {
        for task in [SYNC_TASK, HEAL_TASK] {
            let _ = schtasks(&["/Delete", "/F", "/TN", task]);
        }
        info!("removed Task Scheduler tasks");
        Ok(())
    }

    fn is_installed(&self) -> Result<bool> {
        let output = schtasks(&["/Query", "/TN", SYNC_TASK])?;
        Ok(output.status.success())
    }

    fn label(&self) -> &'static str {
        "Task Scheduler"
    }
}
