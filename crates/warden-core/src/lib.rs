//! warden-core - Reconciliation and safety engine.
//!
//! Everything that decides what gets blocked or unblocked lives here:
//! the schedule evaluator, the validated policy model, the durable
//! pending-action queue, the panic/pause override layer, the pure
//! reconciler, the audit log and the PIN gate. No network I/O; the
//! remote client is a separate crate so tests can inject a fake.

pub mod audit;
pub mod domain;
pub mod duration;
pub mod error;
pub mod events;
pub mod overrides;
pub mod paths;
pub mod pending;
pub mod pin;
pub mod policy;
pub mod reconcile;
pub mod schedule;
pub mod state;
pub mod unlock;

pub use audit::{Actor, AuditLog, AuditVerb};
pub use duration::Delay;
pub use error::WardenError;
pub use events::{Event, EventSink, TickSummary};
pub use overrides::OverrideState;
pub use pending::{PendingAction, PendingStatus, PendingStore, Target, TargetKind};
pub use policy::{Policy, PolicySnapshot};
pub use reconcile::{compute_plan, RemoteSnapshot, TickPlan};
pub use schedule::{is_available, Schedule};
