//! launchd agents for macOS: two plists under ~/Library/LaunchAgents
//! with StartInterval 120/300, loaded via launchctl.

use super::{Scheduler, HEAL_INTERVAL_SECS, SYNC_INTERVAL_SECS};
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

const SYNC_LABEL: &str = "io.warden.sync";
const HEAL_LABEL: &str = "io.warden.heal";

pub struct LaunchdScheduler;

fn agents_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow!("no home directory"))?;
    Ok(home.join("Library").join("LaunchAgents"))
}

fn plist(label: &str, exe: &Path, args: &[&str], interval_secs: u64) -> String {
    let arg_items: String = args
        .iter()
        .map(|a| format!("        <string>{a}</string>\n"))
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \
         \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n\
         <plist version=\"1.0\">\n\
         <dict>\n\
         \x20   <key>Label</key>\n\
         \x20   <string>{label}</string>\n\
         \x20   <key>ProgramArguments</key>\n\
         \x20   <array>\n\
         \x20       <string>{}</string>\n\
         {arg_items}\
         \x20   </array>\n\
         \x20   <key>StartInterval</key>\n\
         \x20   <integer>{interval_secs}</integer>\n\
         \x20   <key>RunAtLoad</key>\n\
         \x20   <false/>\n\
         </dict>\n\
         </plist>\n",
        exe.display()
    )
}

fn launchctl(args: &[&str]) -> Result<std::process::Output> {
    Command::new("launchctl")
        .args(args)
        .output()
        .map_err(|e| anyhow!("failed to run launchctl: {e}"))
}

impl Scheduler for LaunchdScheduler {
    fn install(&self, exe: &Path) -> Result<()> {
        let dir = agents_dir()?;
        std::fs::create_dir_all(&dir)?;

        let sync_path = dir.join(format!("{SYNC_LABEL}.plist"));
        let heal_path = dir.join(format!("{HEAL_LABEL}.plist"));
        std::fs::write(
            &sync_path,
            plist(SYNC_LABEL, exe, &["sync", "--scheduled"], SYNC_INTERVAL_SECS),
        )?;
        std::fs::write(
            &heal_path,
            plist(HEAL_LABEL, exe, &["watchdog", "heal"], HEAL_INTERVAL_SECS),
        )?;

        let _ = launchctl(&["unload", &sync_path.to_string_lossy()]);
        let _ = launchctl(&["unload", &heal_path.to_string_lossy()]);
        launchctl(&["load", &sync_path.to_string_lossy()])?;
        launchctl(&["load", &heal_path.to_string_lossy()])?;

        info!("installed launchd agents {SYNC_LABEL} and {HEAL_LABEL}");
        Ok(())
    }

    fn uninstall(&self) -> Result<()> {
        let dir = agents_dir()?;
        for label in [SYNC_LABEL, HEAL_LABEL] {
            let path = dir.join(format!("{label}.plist"));
            if path.exists() {
                let _ = launchctl(&["unload", &path.to_string_lossy()]);
                std::fs::remove_file(path)?;
            }
        }
        info!("removed launchd agents");
        Ok(())
    }

    fn is_installed(&self) -> Result<bool> {
        let output = launchctl(&["list", SYNC_LABEL])?;
        Ok(output.status.success())
    }

    fn label(&self) -> &'static str {
        "launchd"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plist_rendering() {
        let rendered = plist(
            SYNC_LABEL,
            Path::new("/usr/local/bin/wardenctl"),
            &["sync", "--scheduled"],
            120,
        );
        assert!(rendered.contains("<string>io.warden.sync</string>"));
        assert!(rendered.contains("<string>/usr/local/bin/wardenctl</string>"));
        assert!(rendered.contains("<string>--scheduled</string>"));
        assert!(rendered.contains("<integer>120</integer>"));
    }
}
