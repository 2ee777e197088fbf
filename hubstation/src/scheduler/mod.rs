//! Transfer scheduler.
//!
//! Runs one recurring job per monitored backend. At most one runner exists at
//! a time: starting a new one first cancels the previous runner and waits for
//! every one of its jobs to exit.

pub mod task;

pub use task::JobHandle;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use task::Runner;

/// Body of a recurring job, called with the backend id.
pub type TransferJob = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

pub struct TransferScheduler {
    parent_token: CancellationToken,
    runner: Mutex<Option<Runner>>,
    generation: AtomicU64,
}

impl TransferScheduler {
    /// Jobs are cancelled when `parent_token` is.
    pub fn new(parent_token: CancellationToken) -> Self {
        Self {
            parent_token,
            runner: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Replace the running jobs with one job per id in `downloader_ids`.
    ///
    /// The previous runner is fully stopped before anything new is spawned.
    /// With no ids the scheduler stays stopped. Returns the new runner's
    /// generation, or `None` when nothing was started.
    pub async fn start(
        &self,
        downloader_ids: &[String],
        interval: Duration,
        job: TransferJob,
    ) -> Option<u64> {
        let mut slot = self.runner.lock().await;
        if let Some(previous) = slot.take() {
            debug!(generation = previous.generation, "Stopping previous transfer runner");
            previous.shutdown().await;
        }

        if downloader_ids.is_empty() || self.parent_token.is_cancelled() {
            return None;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = self.parent_token.child_token();
        let jobs = downloader_ids
            .iter()
            .map(|id| {
                let join = tokio::spawn(run_job(id.clone(), interval, job.clone(), token.clone()));
                JobHandle::new(id.clone(), generation, join)
            })
            .collect();

        *slot = Some(Runner {
            generation,
            token,
            jobs,
        });
        info!(
            generation,
            jobs = downloader_ids.len(),
            interval_secs = interval.as_secs(),
            "Transfer service started"
        );
        Some(generation)
    }

    /// Stop the current runner, if any. Idempotent.
    pub async fn stop(&self) {
        let previous = self.runner.lock().await.take();
        if let Some(runner) = previous {
            let generation = runner.generation;
            runner.shutdown().await;
            info!(generation, "Transfer service stopped");
        }
    }

    /// Generation of the most recently started runner; 0 before the first.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Backend ids of the current runner's live jobs.
    pub async fn active_jobs(&self) -> Vec<String> {
        self.runner
            .lock()
            .await
            .as_ref()
            .map(|runner| {
                runner
                    .jobs
                    .iter()
                    .filter(|job| !job.is_finished())
                    .map(|job| job.downloader_id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn is_running(&self) -> bool {
        self.runner.lock().await.is_some()
    }
}

async fn run_job(downloader_id: String, interval: Duration, job: TransferJob, token: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        tokio::select! {
            _ = token.cancelled() => break,
            _ = job(downloader_id.clone()) => {}
        }
    }
    debug!(downloader_id = %downloader_id, "Transfer job exited");
}
