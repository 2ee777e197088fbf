//! Backend and download-setting profile repository.

use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::{FromRow, SqlitePool};
use tracing::warn;

use crate::Result;
use crate::database::models::{DownloadSettingDbModel, DownloaderDbModel};

/// Read-only access to persisted profiles.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Backend rows in id order. Rows that cannot be decoded are `None`.
    async fn list_downloaders(&self) -> Result<Vec<Option<DownloaderDbModel>>>;

    /// Download setting rows in id order.
    async fn list_download_settings(&self) -> Result<Vec<DownloadSettingDbModel>>;
}

/// SQLx implementation of ProfileRepository.
pub struct SqlxProfileRepository {
    pool: SqlitePool,
}

impl SqlxProfileRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileRepository for SqlxProfileRepository {
    async fn list_downloaders(&self) -> Result<Vec<Option<DownloaderDbModel>>> {
        let rows = sqlx::query("SELECT * FROM downloader ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| match DownloaderDbModel::from_row(row) {
                Ok(model) => Some(model),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable downloader row");
                    None
                }
            })
            .collect())
    }

    async fn list_download_settings(&self) -> Result<Vec<DownloadSettingDbModel>> {
        let settings = sqlx::query_as::<_, DownloadSettingDbModel>(
            "SELECT * FROM download_setting ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(settings)
    }
}

/// In-memory implementation of ProfileRepository.
#[derive(Default)]
pub struct StaticProfileRepository {
    downloaders: RwLock<Vec<Option<DownloaderDbModel>>>,
    settings: RwLock<Vec<DownloadSettingDbModel>>,
}

impl StaticProfileRepository {
    pub fn new(
        downloaders: Vec<Option<DownloaderDbModel>>,
        settings: Vec<DownloadSettingDbModel>,
    ) -> Self {
        Self {
            downloaders: RwLock::new(downloaders),
            settings: RwLock::new(settings),
        }
    }

    pub fn set_downloaders(&self, downloaders: Vec<Option<DownloaderDbModel>>) {
        *self.downloaders.write() = downloaders;
    }

    pub fn set_download_settings(&self, settings: Vec<DownloadSettingDbModel>) {
        *self.settings.write() = settings;
    }
}

#[async_trait]
impl ProfileRepository for StaticProfileRepository {
    async fn list_downloaders(&self) -> Result<Vec<Option<DownloaderDbModel>>> {
        Ok(self.downloaders.read().clone())
    }

    async fn list_download_settings(&self) -> Result<Vec<DownloadSettingDbModel>> {
        Ok(self.settings.read().clone())
    }
}
