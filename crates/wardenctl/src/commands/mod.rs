//! One module per CLI verb, plus the shared command context.

pub mod lists;
pub mod panic_cmd;
pub mod pause;
pub mod pending_cmd;
pub mod protection_cmd;
pub mod status;
pub mod sync;
pub mod watchdog_cmd;

use crate::credentials;
use anyhow::Result;
use std::path::PathBuf;
use warden_core::audit::{Actor, AuditLog};
use warden_core::overrides::OverrideStore;
use warden_core::paths;
use warden_core::pending::PendingStore;
use warden_core::pin::PinGate;
use warden_core::policy::{Policy, PolicySnapshot};
use warden_core::unlock::UnlockStore;
use warden_nextdns::{ClientConfig, NextDnsClient};

/// Where everything lives for the duration of one command.
pub struct Ctx {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl Ctx {
    pub fn new(config_dir_override: Option<String>) -> Result<Self> {
        if let Some(dir) = config_dir_override {
            std::env::set_var("WARDEN_CONFIG_DIR", dir);
        }
        paths::ensure_dirs()?;
        Ok(Self {
            config_dir: paths::config_dir(),
            data_dir: paths::data_dir(),
        })
    }

    pub fn audit(&self, actor: Actor) -> AuditLog {
        AuditLog::new(&paths::log_dir(), actor)
    }

    pub fn overrides(&self) -> OverrideStore {
        OverrideStore::new(&self.data_dir)
    }

    pub fn pending(&self) -> PendingStore {
        PendingStore::new(&self.data_dir)
    }

    pub fn pin(&self) -> PinGate {
        PinGate::new(&self.data_dir)
    }

    pub fn unlock(&self) -> UnlockStore {
        UnlockStore::new(&self.data_dir)
    }

    pub fn policy_path(&self) -> PathBuf {
        self.config_dir.join("policy.json")
    }

    pub fn last_sync_path(&self) -> PathBuf {
        self.data_dir.join("last_sync.json")
    }

    pub fn load_policy(&self) -> Result<PolicySnapshot> {
        Ok(Policy::load(&self.policy_path())?)
    }

    pub fn client(&self) -> Result<NextDnsClient> {
        let creds = credentials::load(&self.config_dir)?;
        Ok(NextDnsClient::new(ClientConfig::new(
            &creds.api_key,
            &creds.profile_id,
        ))?)
    }
}
