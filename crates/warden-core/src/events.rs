//! Typed events handed to external notifiers.
//!
//! The core never talks to Discord or the desktop; it emits these
//! values through an `EventSink` and lets an adapter decide delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One reconciliation or operator event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    DomainBlocked { domain: String },
    DomainUnblocked { domain: String },
    DomainAllowed { domain: String },
    DomainDisallowed { domain: String },
    CategoryActivated { id: String },
    CategoryDeactivated { id: String },
    ServiceActivated { id: String },
    ServiceDeactivated { id: String },
    PanicStarted { until: DateTime<Utc> },
    PanicExtended { until: DateTime<Utc> },
    PanicEnded,
    Paused { until: DateTime<Utc> },
    Resumed,
    PendingCreated {
        id: String,
        target: String,
        execute_at: DateTime<Utc>,
    },
    /// `reblock_expected` marks the execute-then-re-block case: the
    /// unblock happened, but the schedule will re-block it next tick.
    PendingExecuted {
        id: String,
        target: String,
        reblock_expected: bool,
    },
    PendingCancelled { id: String, target: String },
    TickCompleted { summary: TickSummary },
}

/// Counters for one reconciler tick, persisted for `status`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickSummary {
    pub at: Option<DateTime<Utc>>,
    pub blocked: usize,
    pub unblocked: usize,
    pub allowed: usize,
    pub disallowed: usize,
    pub pc_activated: usize,
    pub pc_deactivated: usize,
    pub pending_executed: usize,
    pub errors: usize,
    #[serde(default)]
    pub error_causes: Vec<String>,
    pub duration_ms: u64,
    #[serde(default)]
    pub dry_run: bool,
}

impl TickSummary {
    pub fn mutations(&self) -> usize {
        self.blocked
            + self.unblocked
            + self.allowed
            + self.disallowed
            + self.pc_activated
            + self.pc_deactivated
    }
}

/// Receiver for events; implementations must not block the tick.
pub trait EventSink {
    fn emit(&self, event: &Event);
}

/// Sink that drops everything, for dry runs and tests.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &Event) {}
}
