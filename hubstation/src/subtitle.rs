//! Site subtitle fetching.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::Result;
use crate::downloader::model::MediaInfo;

/// One subtitle download, owned entirely by the spawned task.
#[derive(Debug, Clone)]
pub struct SubtitleJob {
    pub media: MediaInfo,
    pub page_url: String,
    pub site_id: String,
    pub cookie: Option<String>,
    pub user_agent: Option<String>,
    /// Directory the subtitle files should be written to.
    pub target_dir: PathBuf,
}

#[async_trait]
pub trait SubtitleFetcher: Send + Sync {
    async fn fetch(&self, job: SubtitleJob) -> Result<()>;
}

/// Fetcher that does nothing.
#[derive(Debug, Default)]
pub struct NoopSubtitleFetcher;

#[async_trait]
impl SubtitleFetcher for NoopSubtitleFetcher {
    async fn fetch(&self, job: SubtitleJob) -> Result<()> {
        debug!(
            title = %job.media.title,
            site = %job.site_id,
            dir = %job.target_dir.display(),
            "Subtitle fetching is not configured"
        );
        Ok(())
    }
}
