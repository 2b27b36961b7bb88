//! Generic key/value cache with per-entry expiry.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A cached value with its write time and expiration time.
#[derive(Clone)]
struct CacheEntry<V> {
    value: V,
    written_at: Instant,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Thread-safe TTL cache.
///
/// Reads never return an expired value: `get` removes it on the spot and the
/// optional sweeper task clears the rest. Writes are last-write-wins by the
/// time the value was observed, so a slow lookup finishing late cannot
/// overwrite a fresher one.
#[derive(Clone)]
pub struct TtlCache<V> {
    entries: Arc<DashMap<String, CacheEntry<V>>>,
}

impl<V> Default for TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Get a live value. Returns None if absent or expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let entry = self.entries.get(key)?;

        if entry.is_expired(now) {
            drop(entry); // Release the shard lock before removing
            self.entries
                .remove_if(key, |_, entry| entry.is_expired(Instant::now()));
            return None;
        }

        Some(entry.value.clone())
    }

    /// Store a value observed now.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.set_observed(key, value, ttl, Instant::now());
    }

    /// Store a value observed at `observed_at`.
    ///
    /// Ignored if the current entry was observed later. Returns whether the
    /// value was stored.
    pub fn set_observed(
        &self,
        key: impl Into<String>,
        value: V,
        ttl: Duration,
        observed_at: Instant,
    ) -> bool {
        let entry = CacheEntry {
            value,
            written_at: observed_at,
            expires_at: observed_at + ttl,
        };

        match self.entries.entry(key.into()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                if current.written_at > observed_at && !current.is_expired(Instant::now()) {
                    return false;
                }
                occupied.insert(entry);
                true
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                true
            }
        }
    }

    /// Remove a key. Returns whether a live entry was removed.
    pub fn invalidate(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired(now))
    }

    /// Remove all expired entries from the cache.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Start a background task that purges expired entries every `interval`.
    pub fn spawn_sweeper(&self, interval: Duration, cancel_token: CancellationToken) -> JoinHandle<()> {
        let cache = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Cache sweeper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let purged = cache.purge_expired();
                        if purged > 0 {
                            debug!(purged, remaining = cache.len(), "Purged expired cache entries");
                        }
                    }
                }
            }
        })
    }
}
