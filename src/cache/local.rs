// In-process cache backend with per-key TTL
//
// Deadlines live in a single ordered index instead of one timer per key; one
// background task sleeps until the earliest deadline and purges what expired.
// Reads also check the deadline, so an expired entry is never returned even if
// the evictor has not run yet.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    pub items_count: usize,
    pub hit_count: usize,
    pub miss_count: usize,
    pub expired_count: usize,
    pub deleted_count: usize,
}

// A `*` wildcard key pattern, same syntax as the remote backend's MATCH
#[derive(Debug, Clone)]
pub struct KeyPattern {
    raw: String,
    compiled: Option<glob::Pattern>,
}

impl KeyPattern {
    pub fn new(raw: &str) -> Self {
        let compiled = match glob::Pattern::new(raw) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!("Invalid cache key pattern {raw:?} ({e}), matching literally");
                None
            }
        };
        Self {
            raw: raw.to_string(),
            compiled,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, key: &str) -> bool {
        match &self.compiled {
            Some(p) => p.matches(key),
            None => self.raw == key,
        }
    }
}

struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_alive(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| now < deadline)
    }
}

#[derive(Default)]
pub struct LocalCache {
    store: DashMap<String, CacheEntry>,
    // deadline -> keys; the first entry is the next thing to expire
    min_heap: Mutex<BTreeMap<Instant, HashSet<String>>>,
    cache_stats: RwLock<CacheStats>,
    wakeup: Notify,
    evictor: Mutex<Option<JoinHandle<()>>>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    // A zero TTL stores the value without expiry
    pub fn set(&self, key: &str, value: String, ttl: Duration) {
        let now = Instant::now();
        let expires_at = (!ttl.is_zero()).then(|| now + ttl);

        let previous = self.store.insert(
            key.to_string(),
            CacheEntry { value, expires_at },
        );

        let mut index = self.min_heap.lock();
        if let Some(old_deadline) = previous.and_then(|e| e.expires_at) {
            if let Some(keys) = index.get_mut(&old_deadline) {
                keys.remove(key);
                if keys.is_empty() {
                    index.remove(&old_deadline);
                }
            }
        }

        if let Some(deadline) = expires_at {
            let is_earliest = index.first_key_value().map_or(true, |(first, _)| deadline < *first);
            index.entry(deadline).or_default().insert(key.to_string());
            drop(index);
            if is_earliest {
                self.wakeup.notify_one();
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let hit = self
            .store
            .get(key)
            .filter(|entry| entry.is_alive(now))
            .map(|entry| entry.value.clone());

        let mut stats = self.cache_stats.write();
        if hit.is_some() {
            stats.hit_count += 1;
        } else {
            stats.miss_count += 1;
            drop(stats);
            // Lazily drop an expired entry
            if self
                .store
                .remove_if(key, |_, entry| !entry.is_alive(now))
                .is_some()
            {
                self.cache_stats.write().expired_count += 1;
            }
        }
        hit
    }

    pub fn del(&self, key: &str) -> bool {
        let removed = self.store.remove(key).is_some();
        if removed {
            self.cache_stats.write().deleted_count += 1;
        }
        removed
    }

    // Removes every live key matching the pattern and returns how many were removed
    pub fn del_by_pattern(&self, pattern: &KeyPattern) -> usize {
        let now = Instant::now();
        let keys: Vec<String> = self
            .store
            .iter()
            .filter(|entry| pattern.matches(entry.key()))
            .map(|entry| entry.key().to_string())
            .collect();

        let mut removed = 0;
        for key in keys {
            if let Some((_, entry)) = self.store.remove(&key) {
                if entry.is_alive(now) {
                    removed += 1;
                }
            }
        }

        self.cache_stats.write().deleted_count += removed;
        debug!("Local cache removed {removed} keys matching {}", pattern.as_str());
        removed
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = self.cache_stats.read().clone();
        stats.items_count = self.store.len();
        stats
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.min_heap.lock().first_key_value().map(|(k, _)| *k)
    }

    // Drops every entry whose deadline has passed; returns the number removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut due = Vec::new();
        {
            let mut index = self.min_heap.lock();
            while let Some(entry) = index.first_entry() {
                if *entry.key() > now {
                    break;
                }
                due.extend(entry.remove());
            }
        }

        let mut purged = 0;
        for key in due {
            // The index can be stale if the key was rewritten; re-check the entry itself
            if self
                .store
                .remove_if(&key, |_, entry| !entry.is_alive(now))
                .is_some()
            {
                purged += 1;
            }
        }
        if purged > 0 {
            self.cache_stats.write().expired_count += purged;
        }
        purged
    }

    // Starts the background evictor; must be called from within a tokio runtime
    pub fn start_eviction(self: &Arc<Self>) {
        let mut evictor = self.evictor.lock();
        if evictor.is_some() {
            return;
        }
        let cache = self.clone();
        *evictor = Some(tokio::spawn(async move {
            loop {
                match cache.next_deadline() {
                    Some(deadline) => {
                        tokio::select! {
                            _ = tokio::time::sleep_until(deadline) => {
                                let purged = cache.purge_expired();
                                if purged > 0 {
                                    debug!("Evicted {purged} expired local cache entries");
                                }
                            }
                            _ = cache.wakeup.notified() => {}
                        }
                    }
                    None => cache.wakeup.notified().await,
                }
            }
        }));
    }

    // Stops the evictor and drops every entry
    pub fn shutdown(&self) {
        if let Some(evictor) = self.evictor.lock().take() {
            evictor.abort();
        }
        self.min_heap.lock().clear();
        self.store.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_round_trip_then_expiry() {
        let cache = LocalCache::new();
        cache.set("unit:1:status", "\"Disponible\"".into(), Duration::from_secs(30));
        assert_eq!(cache.get("unit:1:status").as_deref(), Some("\"Disponible\""));

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(cache.get("unit:1:status").is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("unit:1:status").is_none());
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().expired_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evictor_purges_in_background() {
        let cache = Arc::new(LocalCache::new());
        cache.start_eviction();

        cache.set("a", "1".into(), Duration::from_secs(5));
        cache.set("b", "2".into(), Duration::from_secs(60));
        cache.set("c", "3".into(), Duration::ZERO);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(cache.len(), 2);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("c").as_deref(), Some("3"));

        cache.shutdown();
        assert!(cache.is_empty());
        assert!(cache.next_deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rewrite_moves_deadline() {
        let cache = LocalCache::new();
        cache.set("k", "old".into(), Duration::from_secs(2));
        cache.set("k", "new".into(), Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(cache.purge_expired(), 0);
        assert_eq!(cache.get("k").as_deref(), Some("new"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pattern_delete_is_scoped_to_unit() {
        let cache = LocalCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("unit:42:status", "a".into(), ttl);
        cache.set("unit:42:detail", "b".into(), ttl);
        cache.set("unit:42:availability:2025-06-01:2025-06-05:1", "c".into(), ttl);
        cache.set("unit:421:status", "d".into(), ttl);
        cache.set("unit:4:status", "e".into(), ttl);
        cache.set("units:all", "f".into(), ttl);

        let removed = cache.del_by_pattern(&KeyPattern::new("unit:42:*"));
        assert_eq!(removed, 3);
        assert!(cache.get("unit:421:status").is_some());
        assert!(cache.get("unit:4:status").is_some());
        assert!(cache.get("units:all").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pattern_delete_counts_only_live_keys() {
        let cache = LocalCache::new();
        cache.set("units:available:cabins", "a".into(), Duration::from_secs(1));
        cache.set("units:available:hostels", "b".into(), Duration::from_secs(100));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.del_by_pattern(&KeyPattern::new("units:available:*")), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalid_pattern_matches_literally() {
        let pattern = KeyPattern::new("units:[");
        assert!(pattern.matches("units:["));
        assert!(!pattern.matches("units:a"));
    }
}
