//! systemd user units: warden-sync.timer (120 s) and warden-heal.timer
//! (300 s), written to ~/.config/systemd/user and enabled with
//! `systemctl --user`.

use super::{Scheduler, HEAL_INTERVAL_SECS, SYNC_INTERVAL_SECS};
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

const SYNC_UNIT: &str = "warden-sync";
const HEAL_UNIT: &str = "warden-heal";

pub struct SystemdScheduler;

fn unit_dir() -> Result<PathBuf> {
    let config = dirs::config_dir().ok_or_else(|| anyhow!("no user config directory"))?;
    Ok(config.join("systemd").join("user"))
}

fn service_unit(description: &str, exe: &Path, args: &str) -> String {
    format!(
        "[Unit]\n\
         Description={description}\n\n\
         [Service]\n\
         Type=oneshot\n\
         ExecStart={} {args}\n",
        exe.display()
    )
}

fn timer_unit(description: &str, service: &str, interval_secs: u64) -> String {
    format!(
        "[Unit]\n\
         Description={description}\n\n\
         [Timer]\n\
         OnBootSec={interval_secs}\n\
         OnUnitActiveSec={interval_secs}\n\
         AccuracySec=10\n\
         Unit={service}.service\n\n\
         [Install]\n\
         WantedBy=timers.target\n"
    )
}

fn systemctl(args: &[&str]) -> Result<std::process::Output> {
    Command::new("systemctl")
        .arg("--user")
        .args(args)
        .output()
        .context("failed to run systemctl --user")
}

impl Scheduler for SystemdScheduler {
    fn install(&self, exe: &Path) -> Result<()> {
        let dir = unit_dir()?;
        std::fs::create_dir_all(&dir)?;

        std::fs::write(
            dir.join(format!("{SYNC_UNIT}.service")),
            service_unit("warden reconciler tick", exe, "sync --scheduled"),
        )?;
        std::fs::write(
            dir.join(format!("{SYNC_UNIT}.timer")),
            timer_unit("warden tick every 2 minutes", SYNC_UNIT, SYNC_INTERVAL_SECS),
        )?;
        std::fs::write(
            dir.join(format!("{HEAL_UNIT}.service")),
            service_unit("warden watchdog self-heal", exe, "watchdog heal"),
        )?;
        std::fs::write(
            dir.join(format!("{HEAL_UNIT}.timer")),
            timer_unit("warden self-heal every 5 minutes", HEAL_UNIT, HEAL_INTERVAL_SECS),
        )?;

        run_ok(&["daemon-reload"])?;
        run_ok(&["enable", "--now", &format!("{SYNC_UNIT}.timer")])?;
        run_ok(&["enable", "--now", &format!("{HEAL_UNIT}.timer")])?;

        info!("installed systemd user timers {SYNC_UNIT} and {HEAL_UNIT}");
        Ok(())
    }

    fn uninstall(&self) -> Result<()> {
        let _ = systemctl(&["disable", "--now", &format!("{SYNC_UNIT}.timer")]);
        let _ = systemctl(&["disable", "--now", &format!("{HEAL_UNIT}.timer")]);

        let dir = unit_dir()?;
        for unit in [
            format!("{SYNC_UNIT}.service"),
            format!("{SYNC_UNIT}.timer"),
            format!("{HEAL_UNIT}.service"),
            format!("{HEAL_UNIT}.timer"),
        ] {
            let path = dir.join(unit);
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        run_ok(&["daemon-reload"])?;
        info!("removed systemd user timers");
        Ok(())
    }

    fn is_installed(&self) -> Result<bool> {
        let output = systemctl(&["is-enabled", &format!("{SYNC_UNIT}.timer")])?;
        Ok(output.status.success())
    }

    fn label(&self) -> &'static str {
        "systemd user timer"
    }
}

fn run_ok(args: &[&str]) -> Result<()> {
    let output = systemctl(args)?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("systemctl --user {} failed: {stderr}", args.join(" ")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_rendering() {
        let service = service_unit("tick", Path::new("/usr/bin/wardenctl"), "sync --scheduled");
        assert!(service.contains("ExecStart=/usr/bin/wardenctl sync --scheduled"));
        assert!(service.contains("Type=oneshot"));

        let timer = timer_unit("tick", SYNC_UNIT, 120);
        assert!(timer.contains("OnUnitActiveSec=120"));
        assert!(timer.contains("Unit=warden-sync.service"));
    }
}
