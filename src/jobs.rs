// Periodic maintenance: the pending-reservation expiry sweep and the listing
// cache purge. Both also run on demand.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info};

use crate::cache::keys;
use crate::cache::CacheFacade;
use crate::config::ReservationConfig;
use crate::error::StoreError;
use crate::lifecycle::{ReservationManager, SweepReport};

#[derive(Debug, Default)]
pub struct JobMetrics {
    pub sweeps_run: AtomicU64,
    pub sweep_errors: AtomicU64,
    pub reservations_expired: AtomicU64,
    pub purges_run: AtomicU64,
    pub purges_skipped: AtomicU64,
    pub keys_purged: AtomicU64,
}

async fn run_sweep(
    manager: &ReservationManager,
    metrics: &JobMetrics,
) -> Result<SweepReport, StoreError> {
    metrics.sweeps_run.fetch_add(1, Ordering::Relaxed);
    match manager.sweep_expired().await {
        Ok(report) => {
            metrics
                .reservations_expired
                .fetch_add(report.cancelled as u64, Ordering::Relaxed);
            Ok(report)
        }
        Err(e) => {
            metrics.sweep_errors.fetch_add(1, Ordering::Relaxed);
            error!("Expiry sweep failed: {e}");
            Err(e)
        }
    }
}

async fn run_purge(cache: &CacheFacade, metrics: &JobMetrics) -> u64 {
    let removed = keys::purge_all(cache).await;
    metrics.purges_run.fetch_add(1, Ordering::Relaxed);
    metrics.keys_purged.fetch_add(removed, Ordering::Relaxed);
    info!("Purged {removed} unit and listing cache keys");
    removed
}

pub struct Scheduler {
    manager: Arc<ReservationManager>,
    cache: Arc<CacheFacade>,
    sweep_every: Duration,
    purge_every: Duration,
    metrics: Arc<JobMetrics>,
    shutdown_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        manager: Arc<ReservationManager>,
        cache: Arc<CacheFacade>,
        config: &ReservationConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            manager,
            cache,
            sweep_every: Duration::from_secs(config.sweep_interval_secs.max(1)),
            purge_every: Duration::from_secs(config.listing_purge_interval_secs.max(1)),
            metrics: Arc::new(JobMetrics::default()),
            shutdown_tx,
            handle: Mutex::new(None),
        }
    }

    pub fn metrics(&self) -> &JobMetrics {
        &self.metrics
    }

    // Starts the timers; the first run of each job happens one period from now
    pub fn start(&self) {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return;
        }

        let manager = self.manager.clone();
        let cache = self.cache.clone();
        let metrics = self.metrics.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let (sweep_every, purge_every) = (self.sweep_every, self.purge_every);

        *handle = Some(tokio::spawn(async move {
            let now = Instant::now();
            let mut sweep_interval = interval_at(now + sweep_every, sweep_every);
            sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut purge_interval = interval_at(now + purge_every, purge_every);
            purge_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(
                sweep_interval_secs = sweep_every.as_secs(),
                purge_interval_secs = purge_every.as_secs(),
                "Scheduled jobs started"
            );

            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        // A dropped sender also means shutdown
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = sweep_interval.tick() => {
                        // Failures are logged and counted; the next tick tries again
                        let _ = run_sweep(&manager, &metrics).await;
                    }
                    _ = purge_interval.tick() => {
                        if cache.is_degraded() {
                            metrics.purges_skipped.fetch_add(1, Ordering::Relaxed);
                            info!("Local cache in use, skipping scheduled listing purge");
                        } else {
                            run_purge(&cache, &metrics).await;
                        }
                    }
                }
            }
            info!("Scheduled jobs stopped");
        }));
    }

    pub async fn run_sweep_now(&self) -> Result<SweepReport, StoreError> {
        run_sweep(&self.manager, &self.metrics).await
    }

    // Runs regardless of which cache backend is active
    pub async fn run_listing_purge_now(&self) -> u64 {
        run_purge(&self.cache, &self.metrics).await
    }

    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}
