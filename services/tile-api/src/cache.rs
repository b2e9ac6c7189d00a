//! In-memory LRU cache for encoded endpoint responses.
//!
//! Rendering a tile means opening the source, sampling a window, and
//! encoding an image; repeat requests for the same URL should skip all of
//! that. Entries are keyed by a fingerprint of the route path and query
//! parameters, so two URLs that differ only in parameter order share one
//! entry.
//!
//! Eviction is memory-based rather than count-based: when the configured
//! byte budget is exceeded, a batch of least-recently-used entries
//! (~5% of the budget) is dropped to make room. TTL is enforced lazily on
//! read.

use bytes::Bytes;
use lru::LruCache;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// How long cached responses stay valid: two hours.
pub const DEFAULT_TTL_SECS: u64 = 60 * 60 * 2;

/// Default response cache budget in megabytes.
pub const DEFAULT_MAX_MB: usize = 256;

// The LRU itself is effectively unbounded; eviction is driven by the byte
// budget, not entry count.
const LRU_CAPACITY: usize = 10_000_000;

/// Cache key for a request: route path plus a digest of its query
/// parameters.
///
/// Pairs are sorted and de-duplicated before hashing, so parameter order
/// and repeated identical pairs do not affect the key. The digest is
/// SHA-256, stable across processes and restarts.
pub fn fingerprint(path: &str, params: &[(String, String)]) -> String {
    let mut pairs: Vec<&(String, String)> = params.iter().collect();
    pairs.sort();
    pairs.dedup();
    let mut hasher = Sha256::new();
    for (key, value) in pairs {
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
        hasher.update(value.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}:{}", path, hex)
}

struct CachedResponse {
    payload: Bytes,
    mime: String,
    inserted_at: Instant,
    ttl: Duration,
}

impl CachedResponse {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() > self.ttl
    }

    fn cost(&self) -> u64 {
        (self.payload.len() + self.mime.len()) as u64
    }
}

/// Point-in-time counters, cheap to read without touching the LRU lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired: u64,
    pub size_bytes: u64,
    pub entry_count: u64,
}

#[derive(Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expired: AtomicU64,
    size_bytes: AtomicU64,
    entry_count: AtomicU64,
}

/// Shared response cache with byte-budget eviction and lazy TTL expiry.
pub struct ResponseCache {
    entries: RwLock<LruCache<String, CachedResponse>>,
    max_bytes: u64,
    default_ttl: Duration,
    counters: Arc<CacheCounters>,
}

impl ResponseCache {
    pub fn new(max_size_mb: usize, ttl_secs: u64) -> Self {
        let capacity = NonZeroUsize::new(LRU_CAPACITY).expect("nonzero literal");
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
            max_bytes: (max_size_mb as u64) * 1024 * 1024,
            default_ttl: Duration::from_secs(ttl_secs),
            counters: Arc::new(CacheCounters::default()),
        }
    }

    /// Look up a response. Expired entries are removed on access and count
    /// as misses.
    pub async fn get(&self, key: &str) -> Option<(Bytes, String)> {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                let cost = entry.cost();
                entries.pop(key);
                self.counters.expired.fetch_add(1, Ordering::Relaxed);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                self.counters.size_bytes.fetch_sub(cost, Ordering::Relaxed);
                self.counters.entry_count.fetch_sub(1, Ordering::Relaxed);
                None
            }
            Some(entry) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some((entry.payload.clone(), entry.mime.clone()))
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store an encoded response, evicting old entries first if the byte
    /// budget would be exceeded.
    pub async fn insert(&self, key: String, payload: Bytes, mime: &str) {
        let entry = CachedResponse {
            payload,
            mime: mime.to_string(),
            inserted_at: Instant::now(),
            ttl: self.default_ttl,
        };
        let cost = entry.cost();

        let mut entries = self.entries.write().await;
        let current = self.counters.size_bytes.load(Ordering::Relaxed);
        if current + cost > self.max_bytes {
            self.evict_batch_locked(&mut entries);
        }

        if let Some(existing) = entries.peek(&key) {
            let existing_cost = existing.cost();
            self.counters
                .size_bytes
                .fetch_sub(existing_cost, Ordering::Relaxed);
        } else {
            self.counters.entry_count.fetch_add(1, Ordering::Relaxed);
        }

        entries.put(key, entry);
        self.counters.size_bytes.fetch_add(cost, Ordering::Relaxed);
    }

    /// Drop least-recently-used entries until ~5% of the budget is free.
    ///
    /// Takes the already-locked map so the budget check and the eviction
    /// are a single atomic step.
    fn evict_batch_locked(&self, entries: &mut LruCache<String, CachedResponse>) {
        let target_free = self.max_bytes / 20;
        let mut bytes_freed = 0u64;
        let mut dropped = 0u64;

        while bytes_freed < target_free {
            match entries.pop_lru() {
                Some((_, evicted)) => {
                    bytes_freed += evicted.cost();
                    dropped += 1;
                }
                None => break,
            }
        }

        self.counters
            .size_bytes
            .fetch_sub(bytes_freed, Ordering::Relaxed);
        self.counters
            .entry_count
            .fetch_sub(dropped, Ordering::Relaxed);
        self.counters.evictions.fetch_add(dropped, Ordering::Relaxed);

        debug!(
            entries_dropped = dropped,
            bytes_freed = bytes_freed,
            "response cache batch eviction"
        );
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
            size_bytes: self.counters.size_bytes.load(Ordering::Relaxed),
            entry_count: self.counters.entry_count.load(Ordering::Relaxed),
        }
    }

    pub fn len(&self) -> usize {
        self.counters.entry_count.load(Ordering::Relaxed) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.counters.entry_count.load(Ordering::Relaxed) == 0
    }

    /// Drop every entry and reset the counters.
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.clear();
        self.counters.hits.store(0, Ordering::Relaxed);
        self.counters.misses.store(0, Ordering::Relaxed);
        self.counters.evictions.store(0, Ordering::Relaxed);
        self.counters.expired.store(0, Ordering::Relaxed);
        self.counters.size_bytes.store(0, Ordering::Relaxed);
        self.counters.entry_count.store(0, Ordering::Relaxed);
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MB, DEFAULT_TTL_SECS)
    }
}
