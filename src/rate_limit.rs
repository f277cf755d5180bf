//! Sliding-window-log quota tracker over a pluggable keyed store.
//!
//! Each key holds the unix timestamps of its admitted requests within the
//! trailing window. An admission check prunes stale entries, denies without
//! recording when the ceiling is reached, and otherwise appends the current
//! timestamp. The read-prune-append-write sequence is serialized per key;
//! different keys never contend.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

use crate::config::RateLimitConfig;

/// Quota snapshot carried on every response to an admitted caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitInfo {
    pub limit: usize,
    pub remaining: usize,
    pub reset_seconds: u64,
}

/// Outcome of one admission check.
#[derive(Debug, Clone)]
pub struct Admission {
    pub allowed: bool,
    pub info: RateLimitInfo,
}

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("Quota store unavailable: {0}")]
    Store(String),
}

/// Keyed timestamp storage. An in-process map is enough for a single
/// instance; multi-instance deployments plug in a shared store.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Vec<u64>, QuotaError>;
    async fn put(&self, key: &str, stamps: Vec<u64>, ttl: Duration) -> Result<(), QuotaError>;
}

/// Simple in-memory quota store with lazy TTL expiry.
#[derive(Default)]
pub struct MemoryQuotaStore {
    // key -> (timestamps, wall-clock expiry)
    data: Mutex<HashMap<String, (Vec<u64>, u64)>>,
}

impl MemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuotaStore for MemoryQuotaStore {
    async fn get(&self, key: &str) -> Result<Vec<u64>, QuotaError> {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        match data.get(key) {
            Some((_, expires_at)) if *expires_at <= crate::token::now_secs() => {
                data.remove(key);
                Ok(Vec::new())
            }
            Some((stamps, _)) => Ok(stamps.clone()),
            None => Ok(Vec::new()),
        }
    }

    async fn put(&self, key: &str, stamps: Vec<u64>, ttl: Duration) -> Result<(), QuotaError> {
        let expires_at = crate::token::now_secs() + ttl.as_secs();
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        data.insert(key.to_string(), (stamps, expires_at));
        Ok(())
    }
}

/// Sliding-window admission over a `QuotaStore`.
pub struct RateLimiter {
    store: Arc<dyn QuotaStore>,
    // Per-key admission locks so concurrent checks for the same key cannot
    // both take the last slot. Keys age out of the store, not out of here;
    // a lock entry is a few words.
    locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    limit: usize,
    window_secs: u64,
    fail_open: bool,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn QuotaStore>, config: &RateLimitConfig, fail_open: bool) -> Self {
        Self {
            store,
            locks: DashMap::new(),
            limit: config.limit,
            window_secs: config.window_secs,
            fail_open,
        }
    }

    /// Check whether a request for `key` at `now` (unix seconds) is admitted.
    ///
    /// A denied attempt is not recorded; `reset_seconds` then reports when
    /// the oldest counted entry ages out of the window.
    pub async fn admit(&self, key: &str, now: u64) -> Result<Admission, QuotaError> {
        let lock = {
            let entry = self.locks.entry(key.to_string()).or_default();
            Arc::clone(entry.value())
        };
        let _guard = lock.lock().await;

        let stamps = match self.store.get(key).await {
            Ok(stamps) => stamps,
            Err(e) if self.fail_open => {
                log::warn!(
                    target: "memeforge.rate_limit",
                    "Quota store read failed for {}, treating as unseen: {}",
                    key,
                    e
                );
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let cutoff = now.saturating_sub(self.window_secs);
        let mut stamps: Vec<u64> = stamps.into_iter().filter(|&t| t > cutoff).collect();

        if stamps.len() >= self.limit {
            let oldest = stamps.iter().copied().min().unwrap_or(now);
            let reset_seconds = (oldest + self.window_secs).saturating_sub(now);
            return Ok(Admission {
                allowed: false,
                info: RateLimitInfo {
                    limit: self.limit,
                    remaining: 0,
                    reset_seconds,
                },
            });
        }

        stamps.push(now);
        let used = stamps.len();
        self.store
            .put(key, stamps, Duration::from_secs(self.window_secs + 10))
            .await?;

        Ok(Admission {
            allowed: true,
            info: RateLimitInfo {
                limit: self.limit,
                remaining: self.limit - used,
                reset_seconds: self.window_secs,
            },
        })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// Quota key: client origin + authenticated subject.
pub fn quota_key(origin: &str, subject_id: &str) -> String {
    format!("{}:{}", origin, subject_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(limit: usize, window_secs: u64) -> RateLimiter {
        RateLimiter::new(
            Arc::new(MemoryQuotaStore::new()),
            &RateLimitConfig { limit, window_secs },
            false,
        )
    }

    #[tokio::test]
    async fn test_ceiling_rejects_without_recording() {
        let limiter = limiter(3, 60);
        let now = 1_000;

        for expected_remaining in [2, 1, 0] {
            let admission = limiter.admit("k", now).await.unwrap();
            assert!(admission.allowed);
            assert_eq!(admission.info.remaining, expected_remaining);
        }

        // Fourth attempt in the same window is denied and not recorded.
        let denied = limiter.admit("k", now + 1).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.info.remaining, 0);
        assert_eq!(denied.info.reset_seconds, 59);

        // Denied attempts left no trace: the window still frees up when the
        // original three age out, not later.
        let after = limiter.admit("k", now + 61).await.unwrap();
        assert!(after.allowed);
    }

    #[tokio::test]
    async fn test_window_slides_rather_than_resets() {
        let limiter = limiter(2, 60);

        assert!(limiter.admit("k", 100).await.unwrap().allowed);
        assert!(limiter.admit("k", 130).await.unwrap().allowed);
        assert!(!limiter.admit("k", 140).await.unwrap().allowed);

        // At t=161 only the t=100 entry has aged out; one slot frees up.
        let admission = limiter.admit("k", 161).await.unwrap();
        assert!(admission.allowed);
        assert_eq!(admission.info.remaining, 0);

        // The t=130 entry is still inside the window.
        assert!(!limiter.admit("k", 162).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_keys_do_not_share_quota() {
        let limiter = limiter(1, 60);

        assert!(limiter.admit("a:u1", 10).await.unwrap().allowed);
        assert!(limiter.admit("b:u1", 10).await.unwrap().allowed);
        assert!(!limiter.admit("a:u1", 11).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_boundary_entry_is_stale() {
        let limiter = limiter(1, 60);

        assert!(limiter.admit("k", 100).await.unwrap().allowed);
        // Age exactly equal to the window no longer counts.
        assert!(limiter.admit("k", 160).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_concurrent_admissions_never_exceed_limit() {
        let limiter = Arc::new(limiter(5, 60));
        let mut handles = Vec::new();

        for _ in 0..20 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(
                async move { limiter.admit("k", 50).await.unwrap() },
            ));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap().allowed {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5);
    }

    struct FailingStore;

    #[async_trait]
    impl QuotaStore for FailingStore {
        async fn get(&self, _key: &str) -> Result<Vec<u64>, QuotaError> {
            Err(QuotaError::Store("down".to_string()))
        }

        async fn put(&self, _key: &str, _stamps: Vec<u64>, _ttl: Duration) -> Result<(), QuotaError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_an_error_by_default() {
        let limiter = RateLimiter::new(
            Arc::new(FailingStore),
            &RateLimitConfig {
                limit: 10,
                window_secs: 60,
            },
            false,
        );
        assert!(limiter.admit("k", 10).await.is_err());
    }

    #[tokio::test]
    async fn test_store_failure_admits_when_fail_open() {
        let limiter = RateLimiter::new(
            Arc::new(FailingStore),
            &RateLimitConfig {
                limit: 10,
                window_secs: 60,
            },
            true,
        );
        let admission = limiter.admit("k", 10).await.unwrap();
        assert!(admission.allowed);
        assert_eq!(admission.info.remaining, 9);
    }

    #[tokio::test]
    async fn test_memory_store_ttl_expiry() {
        let store = MemoryQuotaStore::new();
        store
            .put("k", vec![1, 2, 3], Duration::from_secs(0))
            .await
            .unwrap();
        // Zero TTL entries are already expired on read.
        assert!(store.get("k").await.unwrap().is_empty());
    }
}
