//! The production NextDNS client.
//!
//! HTTPS only, `X-Api-Key` header auth, per-request timeout, retries
//! with backoff, a client-side rate limiter in front of every send,
//! and a TTL cache over the two lists. Mutations are idempotent:
//! adding a present domain and removing an absent one both succeed.

use crate::backend::DnsBackend;
use crate::cache::{ListCache, DEFAULT_TTL_SECS};
use crate::error::RemoteError;
use crate::rate_limit::{RateLimiter, DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW_SECS};
use crate::retry::{with_retries, DEFAULT_MAX_RETRIES};
use crate::types::{GlobalFlags, ListEnvelope, ParentalControl, ParentalControlEnvelope};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use std::collections::BTreeSet;
use std::time::Duration;
use warden_core::domain;

pub const API_BASE_URL: &str = "https://api.nextdns.io";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Construction parameters; defaults match the documented contract.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub profile_id: String,
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: usize,
    pub rate_limit_requests: usize,
    pub rate_limit_window: Duration,
    pub cache_ttl: Duration,
}

impl ClientConfig {
    pub fn new(api_key: &str, profile_id: &str) -> Self {
        Self {
            api_key: api_key.trim().to_string(),
            profile_id: profile_id.trim().to_string(),
            base_url: API_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            rate_limit_requests: DEFAULT_MAX_REQUESTS,
            rate_limit_window: Duration::from_secs(DEFAULT_WINDOW_SECS),
            cache_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
        }
    }
}

/// API key: at least 8 chars of `[A-Za-z0-9_-]`.
pub fn valid_api_key(key: &str) -> bool {
    let key = key.trim();
    key.len() >= 8
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Profile id: 4-30 chars of `[A-Za-z0-9_-]`.
pub fn valid_profile_id(id: &str) -> bool {
    let id = id.trim();
    (4..=30).contains(&id.len())
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

pub struct NextDnsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    profile_id: String,
    max_retries: usize,
    limiter: RateLimiter,
    deny_cache: ListCache,
    allow_cache: ListCache,
}

impl NextDnsClient {
    pub fn new(config: ClientConfig) -> Result<Self, RemoteError> {
        if !valid_api_key(&config.api_key) {
            return Err(RemoteError::InvalidCredentials(
                "API key must be at least 8 characters of [A-Za-z0-9_-]".to_string(),
            ));
        }
        if !valid_profile_id(&config.profile_id) {
            return Err(RemoteError::InvalidCredentials(
                "profile id must be 4-30 characters of [A-Za-z0-9_-]".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url,
            api_key: config.api_key,
            profile_id: config.profile_id,
            max_retries: config.max_retries,
            limiter: RateLimiter::new(config.rate_limit_requests, config.rate_limit_window),
            deny_cache: ListCache::new(config.cache_ttl),
            allow_cache: ListCache::new(config.cache_ttl),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/profiles/{}{path}", self.base_url, self.profile_id)
    }

    /// One rate-limited, retried request. `Ok(None)` for empty bodies
    /// and for a tolerated DELETE of an absent item.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        absent_ok: bool,
    ) -> Result<Option<serde_json::Value>, RemoteError> {
        let label = format!("{method} {path}");
        with_retries(&label, self.max_retries, || {
            let method = method.clone();
            async move {
                self.limiter.acquire().await;

                let mut req = self
                    .http
                    .request(method, self.url(path))
                    .header("X-Api-Key", &self.api_key);
                if let Some(body) = body {
                    req = req.json(body);
                }

                let response = req.send().await.map_err(|e| {
                    if e.is_timeout() {
                        RemoteError::Timeout
                    } else {
                        RemoteError::Transport(e.to_string())
                    }
                })?;

                let status = response.status();
                if status.is_success() {
                    let text = response
                        .text()
                        .await
                        .map_err(|e| RemoteError::Transport(e.to_string()))?;
                    if text.trim().is_empty() {
                        return Ok(None);
                    }
                    let value = serde_json::from_str(&text)
                        .map_err(|e| RemoteError::Decode(e.to_string()))?;
                    return Ok(Some(value));
                }

                if absent_ok && status == StatusCode::NOT_FOUND {
                    return Ok(None);
                }

                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);
                Err(RemoteError::from_status(status.as_u16(), retry_after))
            }
        })
        .await
    }

    async fn fetch_list(&self, path: &str) -> Result<BTreeSet<String>, RemoteError> {
        let value = self
            .request(Method::GET, path, None, false)
            .await?
            .unwrap_or_else(|| serde_json::json!({"data": []}));
        let envelope: ListEnvelope =
            serde_json::from_value(value).map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(envelope
            .data
            .into_iter()
            .map(|entry| domain::normalize(&entry.id))
            .collect())
    }

    fn checked(domain_name: &str) -> Result<String, RemoteError> {
        let name = domain::normalize(domain_name);
        if !domain::validate_domain(&name) {
            return Err(RemoteError::InvalidDomain(domain_name.to_string()));
        }
        Ok(name)
    }

    async fn add_to_list(
        &self,
        path: &str,
        cache: &ListCache,
        domain_name: &str,
    ) -> Result<(), RemoteError> {
        let name = Self::checked(domain_name)?;
        let current = cache.get_or_fetch(|| self.fetch_list(path)).await?;
        if current.contains(&name) {
            tracing::debug!("'{name}' already present in {path}, nothing to do");
            return Ok(());
        }

        let body = serde_json::json!({"id": name, "active": true});
        match self.request(Method::POST, path, Some(&body), false).await {
            Ok(_) => {}
            // A concurrent writer beat us to it; the goal state holds.
            Err(RemoteError::Permanent { status: 409 }) => {}
            Err(e) => return Err(e),
        }
        cache.apply(Some(&name), None).await;
        Ok(())
    }

    async fn remove_from_list(
        &self,
        path: &str,
        cache: &ListCache,
        domain_name: &str,
    ) -> Result<(), RemoteError> {
        let name = Self::checked(domain_name)?;
        let current = cache.get_or_fetch(|| self.fetch_list(path)).await?;
        if !current.contains(&name) {
            tracing::debug!("'{name}' not present in {path}, nothing to do");
            return Ok(());
        }

        self.request(Method::DELETE, &format!("{path}/{name}"), None, true)
            .await?;
        cache.apply(None, Some(&name)).await;
        Ok(())
    }
}

#[async_trait]
impl DnsBackend for NextDnsClient {
    async fn get_denylist(&self) -> Result<BTreeSet<String>, RemoteError> {
        self.deny_cache
            .get_or_fetch(|| self.fetch_list("/denylist"))
            .await
    }

    async fn get_allowlist(&self) -> Result<BTreeSet<String>, RemoteError> {
        self.allow_cache
            .get_or_fetch(|| self.fetch_list("/allowlist"))
            .await
    }

    async fn add_deny(&self, domain_name: &str) -> Result<(), RemoteError> {
        self.add_to_list("/denylist", &self.deny_cache, domain_name)
            .await
    }

    async fn remove_deny(&self, domain_name: &str) -> Result<(), RemoteError> {
        self.remove_from_list("/denylist", &self.deny_cache, domain_name)
            .await
    }

    async fn add_allow(&self, domain_name: &str) -> Result<(), RemoteError> {
        self.add_to_list("/allowlist", &self.allow_cache, domain_name)
            .await
    }

    async fn remove_allow(&self, domain_name: &str) -> Result<(), RemoteError> {
        self.remove_from_list("/allowlist", &self.allow_cache, domain_name)
            .await
    }

    async fn set_category(&self, id: &str, active: bool) -> Result<(), RemoteError> {
        let body = serde_json::json!({"active": active});
        self.request(
            Method::PATCH,
            &format!("/parentalControl/categories/{id}"),
            Some(&body),
            false,
        )
        .await?;
        Ok(())
    }

    async fn set_service(&self, id: &str, active: bool) -> Result<(), RemoteError> {
        let patch = serde_json::json!({"active": active});
        let result = self
            .request(
                Method::PATCH,
                &format!("/parentalControl/services/{id}"),
                Some(&patch),
                // Deactivating an absent service is already done.
                !active,
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            // Activating a service the profile has never seen: add it.
            Err(RemoteError::UnknownProfile) if active => {
                let body = serde_json::json!({"id": id, "active": true});
                self.request(Method::POST, "/parentalControl/services", Some(&body), false)
                    .await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn get_parental_control(&self) -> Result<ParentalControl, RemoteError> {
        let value = self
            .request(Method::GET, "/parentalControl", None, false)
            .await?
            .ok_or_else(|| RemoteError::Decode("empty parental-control response".to_string()))?;
        let envelope: ParentalControlEnvelope =
            serde_json::from_value(value).map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(envelope.data)
    }

    async fn update_parental_control_global(
        &self,
        flags: &GlobalFlags,
    ) -> Result<(), RemoteError> {
        let body = serde_json::to_value(flags).map_err(|e| RemoteError::Decode(e.to_string()))?;
        self.request(Method::PATCH, "/parentalControl", Some(&body), false)
            .await?;
        Ok(())
    }
}
