//! Command-line argument parsing.
//!
//! Keeps the clap tree separate from execution logic; each subcommand
//! maps onto one module under `commands/`.

use clap::{Args, Parser, Subcommand};

/// warden - personal domain-access control agent for NextDNS
#[derive(Parser)]
#[command(name = "wardenctl")]
#[command(about = "Reconciles your blocking policy against a NextDNS profile", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Directory holding policy.json and .env (overrides autodetection)
    #[arg(long, global = true, value_name = "DIR")]
    pub config_dir: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one reconciliation tick
    Sync {
        /// Print the plan without applying it
        #[arg(long)]
        dry_run: bool,

        /// Explain per-item decisions
        #[arg(short, long)]
        verbose: bool,

        /// Set when invoked by the platform scheduler (honors the
        /// watchdog disable marker)
        #[arg(long, hide = true)]
        scheduled: bool,
    },

    /// Show overrides, pending actions and the last tick summary
    Status,

    /// Suppress new blocks for a while (default 30 minutes)
    Pause {
        /// Minutes to pause
        minutes: Option<u32>,
    },

    /// End an active pause
    Resume,

    /// Request an unblock, honoring the domain's configured delay
    Unblock {
        /// Domain to unblock
        domain: String,
    },

    /// Add a domain to the remote allowlist
    Allow {
        /// Domain to allow
        domain: String,
    },

    /// Remove a domain from the remote allowlist
    Disallow {
        /// Domain to disallow
        domain: String,
    },

    /// Emergency lockdown: block everything, no early exit
    #[command(subcommand_negates_reqs = true, args_conflicts_with_subcommands = true)]
    Panic {
        #[command(subcommand)]
        action: Option<PanicAction>,

        /// Lockdown duration (minimum 15m), e.g. 1h
        #[arg(value_name = "DURATION")]
        duration: Option<String>,
    },

    /// Inspect or cancel delayed unblocks
    Pending {
        #[command(subcommand)]
        action: PendingAction,
    },

    /// Manage the platform-scheduled reconciler
    Watchdog {
        #[command(subcommand)]
        action: WatchdogAction,
    },

    /// PIN gate and locked-item unlock requests
    Protection {
        #[command(subcommand)]
        action: ProtectionAction,
    },
}

#[derive(Subcommand)]
pub enum PanicAction {
    /// Show the current lockdown state
    Status,
    /// Push the expiration further out
    Extend {
        /// Additional duration, e.g. 30m
        duration: String,
    },
}

#[derive(Subcommand)]
pub enum PendingAction {
    /// List pending actions
    List {
        /// Include executed and cancelled history
        #[arg(long)]
        all: bool,
    },
    /// Show one action in full
    Show { id: String },
    /// Cancel a pending action
    Cancel { id: String },
}

#[derive(Subcommand)]
pub enum WatchdogAction {
    /// Register the periodic tick (and its self-heal task)
    Install,
    /// Remove the registration
    Uninstall,
    /// Show registration and disable state
    Status,
    /// Re-enable a disabled watchdog
    Enable,
    /// Disable ticks for a duration, or permanently
    Disable(DisableArgs),
    /// Reinstall the tick registration if the platform lost it
    #[command(hide = true)]
    Heal,
}

#[derive(Args)]
pub struct DisableArgs {
    /// How long to disable, e.g. 2h (omit with --permanent)
    #[arg(value_name = "DURATION", required_unless_present = "permanent")]
    pub duration: Option<String>,

    /// Disable until explicitly re-enabled
    #[arg(long)]
    pub permanent: bool,
}

#[derive(Subcommand)]
pub enum ProtectionAction {
    /// PIN management
    Pin {
        #[command(subcommand)]
        action: PinAction,
    },
    /// File a delayed removal request for a locked item
    UnlockRequest {
        /// Item kind: category or service
        #[arg(value_parser = ["category", "service"])]
        kind: String,
        /// Item id, e.g. gambling
        id: String,
        /// Optional reason, recorded with the request
        #[arg(long)]
        reason: Option<String>,
    },
    /// Cancel a pending unlock request by id or prefix
    UnlockCancel { id: String },
    /// List pending unlock requests
    UnlockList,
}

#[derive(Subcommand)]
pub enum PinAction {
    /// Set or replace the PIN
    Set,
    /// Show gate, session and lockout state
    Status,
    /// Verify the PIN and open a 30-minute session
    Verify,
    /// Request PIN removal (24-hour delay, cancellable)
    Remove,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_panic_duration_and_subcommands_parse() {
        let cli = Cli::try_parse_from(["wardenctl", "panic", "1h"]).unwrap();
        match cli.command {
            Commands::Panic { action, duration } => {
                assert!(action.is_none());
                assert_eq!(duration.as_deref(), Some("1h"));
            }
            _ => panic!("expected panic"),
        }

        let cli = Cli::try_parse_from(["wardenctl", "panic", "status"]).unwrap();
        match cli.command {
            Commands::Panic { action, .. } => assert!(matches!(action, Some(PanicAction::Status))),
            _ => panic!("expected panic status"),
        }

        let cli = Cli::try_parse_from(["wardenctl", "panic", "extend", "30m"]).unwrap();
        match cli.command {
            Commands::Panic { action, .. } => {
                assert!(matches!(action, Some(PanicAction::Extend { .. })))
            }
            _ => panic!("expected panic extend"),
        }
    }

    #[test]
    fn test_sync_flags() {
        let cli = Cli::try_parse_from(["wardenctl", "sync", "--dry-run", "-v"]).unwrap();
        match cli.command {
            Commands::Sync {
                dry_run, verbose, ..
            } => {
                assert!(dry_run);
                assert!(verbose);
            }
            _ => panic!("expected sync"),
        }
    }

    #[test]
    fn test_watchdog_disable_requires_duration_or_permanent() {
        assert!(Cli::try_parse_from(["wardenctl", "watchdog", "disable"]).is_err());
        assert!(Cli::try_parse_from(["wardenctl", "watchdog", "disable", "2h"]).is_ok());
        assert!(Cli::try_parse_from(["wardenctl", "watchdog", "disable", "--permanent"]).is_ok());
    }
}
