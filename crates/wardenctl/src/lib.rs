//! wardenctl - operator surface and tick executor.
//!
//! The binary is a thin dispatcher; everything testable lives here:
//! the clap tree, the plan executor, the run-token single-flight, the
//! watchdog platform handlers and the per-command entry checks.

pub mod cli;
pub mod commands;
pub mod credentials;
pub mod executor;
pub mod notify;
pub mod runlock;
pub mod watchdog;
