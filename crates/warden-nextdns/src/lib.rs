//! warden-nextdns - typed client for the NextDNS API.
//!
//! Wraps the denylist, allowlist and parental-control resources with
//! client-side rate limiting, retry with backoff, a TTL cache over the
//! two lists, and idempotent mutations. Everything the reconciler
//! needs goes through the [`DnsBackend`] trait so tests inject a fake.

pub mod backend;
pub mod cache;
pub mod client;
pub mod error;
pub mod rate_limit;
pub mod retry;
pub mod types;

pub use backend::DnsBackend;
pub use client::{ClientConfig, NextDnsClient};
pub use error::RemoteError;
