// Tiered cache: a remote shared cache with a local in-process fallback
//
// Every operation tries the remote backend while the link is up. When the link
// drops (or a single remote call errors) the façade flips to degraded mode and
// serves everything from the local backend while a supervisor task reconnects
// with a bounded, doubling backoff. Cache failures never reach the caller.
//
// Deletes issued while degraded are remembered and replayed against the remote
// backend before the façade leaves fallback, so a recovered remote never serves
// an entry that was invalidated during the outage.

pub mod keys;
pub mod local;
pub mod reconnect;
pub mod remote;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::CacheConfig;
use crate::error::CacheError;
use local::{KeyPattern, LocalCache};
use reconnect::{ReconnectPolicy, ReconnectTracker};
use remote::{RedisCache, RemoteCache};

pub const FALLBACK_PONG: &str = "FALLBACK";

// Past this many distinct missed deletes, replay wipes the key families instead
const MAX_MISSED_INVALIDATIONS: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Invalidation {
    Key(String),
    Pattern(String),
}

type MissedInvalidations = Mutex<HashSet<Invalidation>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheHealth {
    pub degraded: bool,
    pub backend: String,
    pub local_entries: usize,
}

pub struct CacheFacade {
    local: Arc<LocalCache>,
    remote: Option<Arc<dyn RemoteCache>>,
    link: Arc<Mutex<ReconnectTracker>>,
    degraded: Arc<AtomicBool>,
    reconnect_signal: Arc<Notify>,
    missed: Arc<MissedInvalidations>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    default_ttl: Duration,
}

impl CacheFacade {
    /// Builds the façade described by `config`: local only when no redis url is
    /// set, otherwise redis with local fallback. Must be called inside a runtime.
    pub fn from_config(config: &CacheConfig) -> Result<Self, CacheError> {
        let remote: Option<Arc<dyn RemoteCache>> = match &config.redis_url {
            Some(url) => Some(Arc::new(RedisCache::new(url)?)),
            None => None,
        };
        let facade = Self::new(remote, ReconnectPolicy::from_config(config))
            .with_default_ttl(Duration::from_secs(config.default_ttl_secs));
        if config.eviction_enabled {
            facade.local.start_eviction();
        }
        Ok(facade)
    }

    // Local backend only; permanently degraded
    pub fn local_only() -> Self {
        let facade = Self::new(None, ReconnectPolicy::default());
        facade.local.start_eviction();
        facade
    }

    pub fn new(remote: Option<Arc<dyn RemoteCache>>, policy: ReconnectPolicy) -> Self {
        let facade = Self {
            local: Arc::new(LocalCache::new()),
            remote,
            link: Arc::new(Mutex::new(ReconnectTracker::new(policy))),
            degraded: Arc::new(AtomicBool::new(true)),
            reconnect_signal: Arc::new(Notify::new()),
            missed: Arc::new(Mutex::new(HashSet::new())),
            supervisor: Mutex::new(None),
            default_ttl: Duration::from_secs(keys::TTL_DEFAULT),
        };
        if let Some(remote) = &facade.remote {
            let handle = tokio::spawn(supervise(
                remote.clone(),
                facade.link.clone(),
                facade.degraded.clone(),
                facade.reconnect_signal.clone(),
                facade.missed.clone(),
            ));
            *facade.supervisor.lock() = Some(handle);
        } else {
            info!("No remote cache configured, using in-memory cache");
        }
        facade
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn local(&self) -> &LocalCache {
        &self.local
    }

    // True while operations are served by the local fallback
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    fn active_remote(&self) -> Option<&Arc<dyn RemoteCache>> {
        if self.is_degraded() {
            None
        } else {
            self.remote.as_ref()
        }
    }

    fn remote_failed(&self, operation: &str, err: CacheError) {
        warn!("Remote cache {operation} failed ({err}), falling back to local cache");
        let was_connected = {
            let mut link = self.link.lock();
            let connected = link.is_connected();
            link.lost();
            connected
        };
        self.degraded.store(true, Ordering::SeqCst);
        if was_connected {
            self.reconnect_signal.notify_one();
        }
    }

    fn remember(&self, invalidation: Invalidation) {
        if self.remote.is_none() {
            return;
        }
        let mut missed = self.missed.lock();
        if missed.len() >= MAX_MISSED_INVALIDATIONS {
            missed.clear();
            for family in keys::FAMILIES {
                missed.insert(Invalidation::Pattern(family.to_string()));
            }
        }
        missed.insert(invalidation);
    }

    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Not caching {key}: {}", CacheError::from(e));
                return;
            }
        };

        if let Some(remote) = self.active_remote() {
            match remote.set(key, &payload, ttl).await {
                Ok(()) => return,
                Err(e) => self.remote_failed("set", e),
            }
        }
        self.local.set(key, payload, ttl);
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.active_remote() {
            Some(remote) => match remote.get(key).await {
                Ok(raw) => raw,
                Err(e) => {
                    self.remote_failed("get", e);
                    self.local.get(key)
                }
            },
            None => self.local.get(key),
        };

        let raw = match raw {
            Some(raw) => raw,
            None => {
                debug!("Cache miss: {key}");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!("Cache hit: {key}");
                Some(value)
            }
            Err(e) => {
                // Shape changed since it was written; treat as a miss
                warn!("Discarding unreadable cache entry {key}: {e}");
                self.del(key).await;
                None
            }
        }
    }

    // Removes the key from the local backend, and from the remote one while connected
    pub async fn del(&self, key: &str) -> bool {
        let mut removed = self.local.del(key);
        match self.active_remote() {
            Some(remote) => match remote.del(key).await {
                Ok(hit) => removed |= hit,
                Err(e) => {
                    self.remote_failed("del", e);
                    self.remember(Invalidation::Key(key.to_string()));
                }
            },
            None => self.remember(Invalidation::Key(key.to_string())),
        }
        removed
    }

    /// Removes every live key matching `pattern` (`*` matches any run of
    /// characters) and returns how many keys were removed.
    pub async fn del_by_pattern(&self, pattern: &str) -> u64 {
        let local_removed = self.local.del_by_pattern(&KeyPattern::new(pattern)) as u64;
        let mut remote_removed = 0;
        match self.active_remote() {
            Some(remote) => match remote.del_by_pattern(pattern).await {
                Ok(count) => remote_removed = count,
                Err(e) => {
                    self.remote_failed("delByPattern", e);
                    self.remember(Invalidation::Pattern(pattern.to_string()));
                }
            },
            None => self.remember(Invalidation::Pattern(pattern.to_string())),
        }
        local_removed.max(remote_removed)
    }

    pub async fn ping(&self) -> String {
        if let Some(remote) = self.active_remote() {
            match remote.ping().await {
                Ok(pong) => return pong,
                Err(e) => self.remote_failed("ping", e),
            }
        }
        FALLBACK_PONG.to_string()
    }

    pub fn health(&self) -> CacheHealth {
        let degraded = self.is_degraded();
        let backend = if degraded { "memory" } else { "redis" };
        CacheHealth {
            degraded,
            backend: backend.to_string(),
            local_entries: self.local.len(),
        }
    }

    // Starts a fresh reconnect round after the budget ran out
    pub fn reconnect(&self) {
        if self.remote.is_none() {
            return;
        }
        self.link.lock().rearm();
        self.reconnect_signal.notify_one();
    }

    // Stops the supervisor and the eviction timer and closes the remote connection
    pub async fn shutdown(&self) {
        if let Some(supervisor) = self.supervisor.lock().take() {
            supervisor.abort();
        }
        if let Some(remote) = &self.remote {
            remote.close().await;
        }
        self.degraded.store(true, Ordering::SeqCst);
        self.local.shutdown();
        info!("Cache shut down");
    }
}

// Applies the deletes the remote backend missed; entries stay queued until applied
async fn replay_missed(
    remote: &dyn RemoteCache,
    missed: &MissedInvalidations,
) -> Result<usize, CacheError> {
    let pending: Vec<Invalidation> = missed.lock().iter().cloned().collect();
    for invalidation in &pending {
        match invalidation {
            Invalidation::Key(key) => {
                remote.del(key).await?;
            }
            Invalidation::Pattern(pattern) => {
                remote.del_by_pattern(pattern).await?;
            }
        }
        missed.lock().remove(invalidation);
    }
    Ok(pending.len())
}

async fn supervise(
    remote: Arc<dyn RemoteCache>,
    link: Arc<Mutex<ReconnectTracker>>,
    degraded: Arc<AtomicBool>,
    signal: Arc<Notify>,
    missed: Arc<MissedInvalidations>,
) {
    loop {
        let (connected, exhausted) = {
            let link = link.lock();
            (link.is_connected(), link.is_exhausted())
        };
        if connected || exhausted {
            signal.notified().await;
            continue;
        }

        let recovered = match remote.connect().await {
            Ok(()) => replay_missed(remote.as_ref(), &missed).await,
            Err(e) => Err(e),
        };

        match recovered {
            Ok(replayed) => {
                link.lock().success();
                degraded.store(false, Ordering::SeqCst);
                // Deletes that raced the flag flip
                if let Err(e) = replay_missed(remote.as_ref(), &missed).await {
                    warn!("Replaying missed cache deletes failed: {e}");
                }
                info!(replayed, "Remote cache available, leaving local fallback");
            }
            Err(e) => {
                degraded.store(true, Ordering::SeqCst);
                let next = link.lock().fail();
                match next {
                    Some(delay) => {
                        warn!("Remote cache connect failed ({e}), retrying in {delay:?}");
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        error!("Remote cache reconnect attempts exhausted, staying local");
                    }
                }
            }
        }
    }
}
