// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! LRU cache of remote key sets, keyed by issuer.
//!
//! Bounded two ways: by entry count (least-recently-used entry evicted on
//! overflow) and by age (entries older than the TTL read as a miss and are
//! dropped).

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use lru::LruCache;

use super::jwks::RemoteJwkSet;

/// Default maximum number of cached issuers.
pub const DEFAULT_CACHE_SIZE: usize = 500;

/// Default maximum age of a cached issuer entry (1 hour).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Cached key set for one issuer.
#[derive(Clone)]
pub struct CacheEntry {
    pub issuer: String,
    pub key_set: Arc<RemoteJwkSet>,
    pub fetched_at: Instant,
}

/// In-process LRU cache mapping issuer → key set.
pub struct KeyCache {
    cache: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

impl KeyCache {
    /// Create a new cache with the given capacity and TTL.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            ttl,
        }
    }

    /// Maximum entry age.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up an issuer.
    ///
    /// Returns `None` if not cached or expired; a hit marks the entry as
    /// most recently used.
    pub fn get(&self, issuer: &str) -> Option<CacheEntry> {
        let mut cache = self.lock();
        if let Some(entry) = cache.get(issuer) {
            if entry.fetched_at.elapsed() < self.ttl {
                return Some(entry.clone());
            }
            // Expired, drop it
            cache.pop(issuer);
        }
        None
    }

    /// Store the key set for an issuer, stamped with the current time.
    pub fn insert(&self, issuer: &str, key_set: Arc<RemoteJwkSet>) -> CacheEntry {
        let entry = CacheEntry {
            issuer: issuer.to_string(),
            key_set,
            fetched_at: Instant::now(),
        };
        self.lock().put(issuer.to_string(), entry.clone());
        entry
    }

    /// Drop the entry for an issuer.
    pub fn invalidate(&self, issuer: &str) {
        self.lock().pop(issuer);
    }

    /// Number of entries currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Entries stay consistent across a panic in another holder, so a
    // poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, LruCache<String, CacheEntry>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for KeyCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE, DEFAULT_CACHE_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_set(issuer: &str) -> Arc<RemoteJwkSet> {
        Arc::new(RemoteJwkSet::new(
            format!("{issuer}/jwks"),
            reqwest::Client::new(),
            DEFAULT_CACHE_TTL,
        ))
    }

    #[test]
    fn cache_insert_and_get() {
        let cache = KeyCache::new(10, Duration::from_secs(300));
        assert!(cache.get("https://a.example").is_none());

        cache.insert("https://a.example", key_set("https://a.example"));

        let entry = cache.get("https://a.example").unwrap();
        assert_eq!(entry.issuer, "https://a.example");
        assert_eq!(entry.key_set.jwks_url(), "https://a.example/jwks");
    }

    #[test]
    fn cache_ttl_expiry() {
        let cache = KeyCache::new(10, Duration::from_millis(1));
        cache.insert("https://a.example", key_set("https://a.example"));

        // Wait for TTL to expire
        std::thread::sleep(Duration::from_millis(5));

        assert!(cache.get("https://a.example").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn cache_never_exceeds_capacity() {
        let cache = KeyCache::new(3, Duration::from_secs(300));
        for i in 0..10 {
            let issuer = format!("https://issuer-{i}.example");
            cache.insert(&issuer, key_set(&issuer));
            assert!(cache.len() <= 3);
        }
        assert_eq!(cache.len(), 3);
        assert!(cache.get("https://issuer-6.example").is_none());
        assert!(cache.get("https://issuer-9.example").is_some());
    }

    #[test]
    fn least_recently_used_is_evicted_first() {
        let cache = KeyCache::new(2, Duration::from_secs(300));
        cache.insert("https://a.example", key_set("https://a.example"));
        cache.insert("https://b.example", key_set("https://b.example"));

        // Touch `a` so `b` becomes the eviction candidate
        assert!(cache.get("https://a.example").is_some());
        cache.insert("https://c.example", key_set("https://c.example"));

        assert!(cache.get("https://a.example").is_some());
        assert!(cache.get("https://b.example").is_none());
        assert!(cache.get("https://c.example").is_some());
    }

    #[test]
    fn cache_invalidate() {
        let cache = KeyCache::default();
        cache.insert("https://a.example", key_set("https://a.example"));
        cache.invalidate("https://a.example");
        assert!(cache.get("https://a.example").is_none());
    }

    #[test]
    fn survives_a_poisoned_lock() {
        let cache = KeyCache::new(10, Duration::from_secs(300));
        cache.insert("https://a.example", key_set("https://a.example"));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = cache.cache.lock().unwrap();
            panic!("holder panicked");
        }));
        assert!(result.is_err());
        assert!(cache.cache.is_poisoned());

        assert!(cache.get("https://a.example").is_some());
        cache.insert("https://b.example", key_set("https://b.example"));
        assert_eq!(cache.len(), 2);
        cache.invalidate("https://a.example");
        assert!(cache.get("https://a.example").is_none());
    }

    #[test]
    fn zero_capacity_holds_one_entry() {
        let cache = KeyCache::new(0, Duration::from_secs(300));
        cache.insert("https://a.example", key_set("https://a.example"));
        cache.insert("https://b.example", key_set("https://b.example"));
        assert_eq!(cache.len(), 1);
    }
}
