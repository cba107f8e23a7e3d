// Throttled request queue
//
// Every call into the backing store goes through here: operations run strictly
// FIFO, one at a time, and the worker waits a fixed interval after each one
// (success or failure) before starting the next.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::StoreError;

type Job = Box<dyn FnOnce() -> BoxFuture<'static, bool> + Send>;

#[derive(Debug, Default)]
pub struct QueueStats {
    pub enqueued: AtomicUsize,
    pub succeeded: AtomicUsize,
    pub failed: AtomicUsize,
    pub depth: AtomicUsize,
}

pub struct RequestQueue {
    tx: mpsc::UnboundedSender<Job>,
    min_interval: Duration,
    stats: Arc<QueueStats>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RequestQueue {
    // Must be called from within a tokio runtime
    pub fn new(min_interval: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let stats = Arc::new(QueueStats::default());
        let worker = tokio::spawn(run_worker(rx, min_interval, stats.clone()));

        Self {
            tx,
            min_interval,
            stats,
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn with_rate(requests_per_second: f64) -> Self {
        Self::new(Duration::from_secs_f64(1.0 / requests_per_second))
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    pub fn depth(&self) -> usize {
        self.stats.depth.load(Ordering::SeqCst)
    }

    /// Queues `operation` and resolves with its own outcome.
    ///
    /// Dropping the returned future does not cancel the operation once it has
    /// been handed to the queue; it still runs in turn.
    pub async fn enqueue<F, Fut, T>(&self, operation: F) -> Result<T, StoreError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, StoreError>> + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();

        let job: Job = Box::new(move || {
            Box::pin(async move {
                let outcome = AssertUnwindSafe(async move { operation().await })
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        Err(StoreError::Api {
                            status: 500,
                            message: "queued operation panicked".to_string(),
                            retryable: false,
                        })
                    });
                let ok = outcome.is_ok();
                // The caller may have stopped waiting
                let _ = result_tx.send(outcome);
                ok
            })
        });

        self.stats.enqueued.fetch_add(1, Ordering::SeqCst);
        self.stats.depth.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(job).is_err() {
            self.stats.depth.fetch_sub(1, Ordering::SeqCst);
            return Err(StoreError::QueueClosed);
        }

        result_rx.await.map_err(|_| StoreError::QueueClosed)?
    }

    // Stops the worker; operations still waiting are dropped and their callers get QueueClosed
    pub fn shutdown(&self) {
        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
        }
    }
}

impl Drop for RequestQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<Job>,
    min_interval: Duration,
    stats: Arc<QueueStats>,
) {
    while let Some(job) = rx.recv().await {
        stats.depth.fetch_sub(1, Ordering::SeqCst);

        if job().await {
            stats.succeeded.fetch_add(1, Ordering::SeqCst);
        } else {
            stats.failed.fetch_add(1, Ordering::SeqCst);
            warn!("Queued store operation failed");
        }

        debug!(
            "Request queue pacing {:?}, {} waiting",
            min_interval,
            stats.depth.load(Ordering::SeqCst)
        );
        tokio::time::sleep(min_interval).await;
    }
}
