//! Asynchronous remote flush for the write-behind strategy.
//!
//! A single worker task drains a bounded queue; global FIFO order subsumes
//! the required per-key FIFO, and inline retry with exponential backoff means
//! a later write can never overtake an earlier one for the same key. After
//! the retry budget is spent the write is dropped and only the error counter
//! records it — write-behind is fire-and-forget by design.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::stats::StatsCollector;
use crate::tier::RemoteTier;

/// One pending remote write.
#[derive(Debug)]
pub(crate) struct FlushJob {
    pub key: String,
    pub bytes: Vec<u8>,
    pub ttl: Duration,
}

/// Retry/backoff policy for the flush worker.
#[derive(Debug, Clone, Copy)]
pub struct FlushPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    /// Base backoff, doubled per attempt.
    pub base_backoff: Duration,
}

/// Bounded queue plus its flush worker.
pub struct WriteBehindQueue {
    tx: Mutex<Option<mpsc::Sender<FlushJob>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<StatsCollector>,
}

impl WriteBehindQueue {
    /// Starts the flush worker. Must be called within a tokio runtime.
    pub fn start(
        remote: RemoteTier,
        stats: Arc<StatsCollector>,
        capacity: usize,
        policy: FlushPolicy,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<FlushJob>(capacity);

        let worker_stats = Arc::clone(&stats);
        let worker = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                flush_one(&remote, &worker_stats, job, policy).await;
            }
            debug!("write-behind queue closed, flush worker exiting");
        });

        Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            stats,
        }
    }

    /// Enqueues a remote write. A full or closed queue drops the job and
    /// bumps the error counter; the original `set` caller is never failed.
    pub(crate) fn enqueue(&self, job: FlushJob) {
        let tx = self.tx.lock().clone();
        match tx {
            Some(tx) => {
                if let Err(e) = tx.try_send(job) {
                    let key = match &e {
                        mpsc::error::TrySendError::Full(job)
                        | mpsc::error::TrySendError::Closed(job) => job.key.clone(),
                    };
                    warn!(key, "write-behind queue rejected job, dropping write");
                    self.stats.record_error();
                }
            }
            None => {
                warn!(key = job.key, "write-behind queue already shut down, dropping write");
                self.stats.record_error();
            }
        }
    }

    /// Closes the queue and waits up to `deadline` for the worker to drain
    /// it. Remaining jobs past the deadline are dropped and logged.
    pub async fn shutdown(&self, deadline: Duration) {
        // Dropping the sender closes the channel; the worker exits after
        // draining whatever is already queued.
        self.tx.lock().take();

        let handle = self.worker.lock().take();
        if let Some(mut handle) = handle {
            match tokio::time::timeout(deadline, &mut handle).await {
                Ok(_) => debug!("write-behind queue drained"),
                Err(_) => {
                    handle.abort();
                    warn!(
                        deadline_ms = deadline.as_millis() as u64,
                        "write-behind flush deadline elapsed, dropping pending writes"
                    );
                    self.stats.record_error();
                }
            }
        }
    }
}

impl std::fmt::Debug for WriteBehindQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteBehindQueue")
            .field("open", &self.tx.lock().is_some())
            .finish()
    }
}

async fn flush_one(remote: &RemoteTier, stats: &StatsCollector, job: FlushJob, policy: FlushPolicy) {
    for attempt in 0..=policy.retries {
        match remote.try_set(&job.key, &job.bytes, job.ttl).await {
            Ok(()) => {
                debug!(key = job.key, attempt, "write-behind flush succeeded");
                return;
            }
            Err(e) if attempt == policy.retries => {
                warn!(
                    key = job.key,
                    attempts = attempt + 1,
                    error = %e,
                    "write-behind retries exhausted, dropping write"
                );
                stats.record_error();
            }
            Err(e) => {
                let backoff = policy.base_backoff * 2u32.saturating_pow(attempt);
                debug!(key = job.key, attempt, error = %e, backoff_ms = backoff.as_millis() as u64, "write-behind flush failed, backing off");
                tokio::time::sleep(backoff).await;
            }
        }
    }
}
