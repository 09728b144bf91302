//! TTL cache over the remote denylist/allowlist.
//!
//! One cache per list per profile. A fresh entry answers reads for
//! `ttl`; any successful mutation invalidates. The fetch happens while
//! the cache lock is held, so a miss under concurrent callers issues
//! exactly one request and everyone else observes the filled entry.

use crate::error::RemoteError;
use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub const DEFAULT_TTL_SECS: u64 = 60;

struct CachedList {
    fetched_at: Instant,
    entries: BTreeSet<String>,
}

pub struct ListCache {
    ttl: Duration,
    inner: Mutex<Option<CachedList>>,
}

impl ListCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(None),
        }
    }

    /// Return the cached set if fresh, otherwise run `fetch` once and
    /// cache its result.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<BTreeSet<String>, RemoteError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<BTreeSet<String>, RemoteError>>,
    {
        let mut guard = self.inner.lock().await;

        if let Some(cached) = guard.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(cached.entries.clone());
            }
        }

        let entries = fetch().await?;
        *guard = Some(CachedList {
            fetched_at: Instant::now(),
            entries: entries.clone(),
        });
        Ok(entries)
    }

    /// Drop the cached entry; the next read refetches.
    pub async fn invalidate(&self) {
        *self.inner.lock().await = None;
    }

    /// Patch the cached set in place after a confirmed mutation, so
    /// reads inside the same tick stay coherent without a refetch.
    pub async fn apply(&self, add: Option<&str>, remove: Option<&str>) {
        let mut guard = self.inner.lock().await;
        if let Some(cached) = guard.as_mut() {
            if let Some(domain) = add {
                cached.entries.insert(domain.to_string());
            }
            if let Some(domain) = remove {
                cached.entries.remove(domain);
            }
        }
    }
}

impl Default for ListCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TTL_SECS))
    }
}
