//! The backend seam between the reconciler and the wire.
//!
//! The executor is generic over this trait; production uses
//! [`crate::client::NextDnsClient`], tests use an in-memory fake.

use crate::error::RemoteError;
use crate::types::{GlobalFlags, ParentalControl};
use async_trait::async_trait;
use std::collections::BTreeSet;
use warden_core::reconcile::RemoteSnapshot;

#[async_trait]
pub trait DnsBackend: Send + Sync {
    async fn get_denylist(&self) -> Result<BTreeSet<String>, RemoteError>;
    async fn get_allowlist(&self) -> Result<BTreeSet<String>, RemoteError>;

    /// Idempotent: adding a present domain succeeds without a write.
    async fn add_deny(&self, domain: &str) -> Result<(), RemoteError>;
    /// Idempotent: removing an absent domain succeeds without a write.
    async fn remove_deny(&self, domain: &str) -> Result<(), RemoteError>;
    async fn add_allow(&self, domain: &str) -> Result<(), RemoteError>;
    async fn remove_allow(&self, domain: &str) -> Result<(), RemoteError>;

    async fn set_category(&self, id: &str, active: bool) -> Result<(), RemoteError>;
    async fn set_service(&self, id: &str, active: bool) -> Result<(), RemoteError>;
    async fn get_parental_control(&self) -> Result<ParentalControl, RemoteError>;
    async fn update_parental_control_global(
        &self,
        flags: &GlobalFlags,
    ) -> Result<(), RemoteError>;

    /// Assemble the remote view the reconciler diffs against.
    async fn snapshot(&self) -> Result<RemoteSnapshot, RemoteError> {
        let denylist = self.get_denylist().await?;
        let allowlist = self.get_allowlist().await?;
        let pc = self.get_parental_control().await?;

        Ok(RemoteSnapshot {
            denylist,
            allowlist,
            active_categories: pc
                .categories
                .iter()
                .filter(|c| c.active)
                .map(|c| c.id.clone())
                .collect(),
            active_services: pc
                .services
                .iter()
                .filter(|s| s.active)
                .map(|s| s.id.clone())
                .collect(),
        })
    }
}
