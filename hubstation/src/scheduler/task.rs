//! Recurring job handles.

use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A handle to one backend's spawned transfer loop.
#[derive(Debug)]
pub struct JobHandle {
    /// Backend the job drives.
    pub downloader_id: String,
    /// Runner generation the job belongs to.
    pub generation: u64,
    /// When the job was spawned.
    pub created_at: Instant,
    pub(super) join: JoinHandle<()>,
}

impl JobHandle {
    pub(super) fn new(downloader_id: String, generation: u64, join: JoinHandle<()>) -> Self {
        Self {
            downloader_id,
            generation,
            created_at: Instant::now(),
            join,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Get the elapsed time since the job was spawned.
    pub fn elapsed(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// The set of jobs started together by one `start()` call.
#[derive(Debug)]
pub(super) struct Runner {
    pub generation: u64,
    pub token: CancellationToken,
    pub jobs: Vec<JobHandle>,
}

impl Runner {
    /// Cancel every job and wait until all of them have exited.
    pub async fn shutdown(self) {
        self.token.cancel();
        for job in self.jobs {
            let id = job.downloader_id.clone();
            if let Err(e) = job.join.await {
                if e.is_panic() {
                    tracing::error!(downloader_id = %id, "Transfer job panicked");
                }
            }
        }
    }
}
