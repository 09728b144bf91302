//! wardenctl entry point: parse, dispatch, map errors to exit codes.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wardenctl::cli::{
    Cli, Commands, PanicAction, PendingAction, PinAction, ProtectionAction, WatchdogAction,
};
use wardenctl::commands::{self, Ctx};
use warden_core::error::{exit, WardenError};
use warden_nextdns::RemoteError;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "wardenctl=info".into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_target(false),
        )
        .init();

    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(()) => exit::OK,
        Err(err) => {
            eprintln!("error: {err:#}");
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let ctx = Ctx::new(cli.config_dir)?;

    match cli.command {
        Commands::Sync {
            dry_run,
            verbose,
            scheduled,
        } => commands::sync::run(&ctx, dry_run, verbose, scheduled).await,
        Commands::Status => commands::status::run(&ctx).await,
        Commands::Pause { minutes } => commands::pause::pause(&ctx, minutes).await,
        Commands::Resume => commands::pause::resume(&ctx).await,
        Commands::Unblock { domain } => commands::lists::unblock(&ctx, &domain).await,
        Commands::Allow { domain } => commands::lists::allow(&ctx, &domain).await,
        Commands::Disallow { domain } => commands::lists::disallow(&ctx, &domain).await,
        Commands::Panic { action, duration } => match (action, duration) {
            (Some(PanicAction::Status), _) => commands::panic_cmd::status(&ctx).await,
            (Some(PanicAction::Extend { duration }), _) => {
                commands::panic_cmd::extend(&ctx, &duration).await
            }
            (None, Some(duration)) => commands::panic_cmd::start(&ctx, &duration).await,
            (None, None) => Err(WardenError::Validation(
                "panic needs a duration (e.g. 'panic 1h') or a subcommand".to_string(),
            )
            .into()),
        },
        Commands::Pending { action } => match action {
            PendingAction::List { all } => commands::pending_cmd::list(&ctx, all).await,
            PendingAction::Show { id } => commands::pending_cmd::show(&ctx, &id).await,
            PendingAction::Cancel { id } => commands::pending_cmd::cancel(&ctx, &id).await,
        },
        Commands::Watchdog { action } => match action {
            WatchdogAction::Install => commands::watchdog_cmd::install(&ctx).await,
            WatchdogAction::Uninstall => commands::watchdog_cmd::uninstall(&ctx).await,
            WatchdogAction::Status => commands::watchdog_cmd::status(&ctx).await,
            WatchdogAction::Enable => commands::watchdog_cmd::enable(&ctx).await,
            WatchdogAction::Disable(args) => {
                commands::watchdog_cmd::disable(&ctx, args.duration.as_deref(), args.permanent)
                    .await
            }
            WatchdogAction::Heal => commands::watchdog_cmd::heal(&ctx).await,
        },
        Commands::Protection { action } => match action {
            ProtectionAction::Pin { action } => match action {
                PinAction::Set => commands::protection_cmd::pin_set(&ctx).await,
                PinAction::Status => commands::protection_cmd::pin_status(&ctx).await,
                PinAction::Verify => commands::protection_cmd::pin_verify(&ctx).await,
                PinAction::Remove => commands::protection_cmd::pin_remove(&ctx).await,
            },
            ProtectionAction::UnlockRequest { kind, id, reason } => {
                commands::protection_cmd::unlock_request(&ctx, &kind, &id, reason).await
            }
            ProtectionAction::UnlockCancel { id } => {
                commands::protection_cmd::unlock_cancel(&ctx, &id).await
            }
            ProtectionAction::UnlockList => commands::protection_cmd::unlock_list(&ctx).await,
        },
    }
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(warden) = err.downcast_ref::<WardenError>() {
        return warden.exit_code();
    }
    if let Some(remote) = err.downcast_ref::<RemoteError>() {
        return remote.exit_code();
    }
    if let Some(io) = err.downcast_ref::<std::io::Error>() {
        if io.kind() == std::io::ErrorKind::Interrupted {
            return exit::INTERRUPTED;
        }
    }
    exit::GENERAL
}
