//! Event sink backed by the log stream.
//!
//! External dispatchers (Discord webhook, desktop toast) consume the
//! same typed events out of process; in-process we just narrate them.

use warden_core::events::{Event, EventSink};

pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: &Event) {
        match event {
            Event::DomainBlocked { domain } => tracing::info!("blocked {domain}"),
            Event::DomainUnblocked { domain } => tracing::info!("unblocked {domain}"),
            Event::DomainAllowed { domain } => tracing::info!("allowed {domain}"),
            Event::DomainDisallowed { domain } => tracing::info!("disallowed {domain}"),
            Event::CategoryActivated { id } => tracing::info!("category '{id}' activated"),
            Event::CategoryDeactivated { id } => tracing::info!("category '{id}' deactivated"),
            Event::ServiceActivated { id } => tracing::info!("service '{id}' activated"),
            Event::ServiceDeactivated { id } => tracing::info!("service '{id}' deactivated"),
            Event::PanicStarted { until } => tracing::warn!("panic lockdown active until {until}"),
            Event::PanicExtended { until } => tracing::warn!("panic extended until {until}"),
            Event::PanicEnded => tracing::info!("panic lockdown expired"),
            Event::Paused { until } => tracing::info!("blocking paused until {until}"),
            Event::Resumed => tracing::info!("blocking resumed"),
            Event::PendingCreated {
                id,
                target,
                execute_at,
            } => tracing::info!("pending unblock {id} for {target} executes at {execute_at}"),
            Event::PendingExecuted {
                id,
                target,
                reblock_expected,
            } => {
                if *reblock_expected {
                    tracing::warn!(
                        "pending unblock {id} for {target} executed; schedule will re-block next tick"
                    );
                } else {
                    tracing::info!("pending unblock {id} for {target} executed");
                }
            }
            Event::PendingCancelled { id, target } => {
                tracing::info!("pending unblock {id} for {target} cancelled")
            }
            Event::TickCompleted { summary } => tracing::info!(
                "tick done: {} mutation(s), {} pending executed, {} error(s) in {}ms",
                summary.mutations(),
                summary.pending_executed,
                summary.errors,
                summary.duration_ms
            ),
        }
    }
}
