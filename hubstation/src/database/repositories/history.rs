//! Download history store.

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::{DownloadHistoryDbModel, NewHistoryRow};
use crate::downloader::model::DownloadRecord;

/// Append-only history of accepted submissions.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn insert(&self, record: &DownloadRecord) -> Result<()>;
}

/// SQLx implementation of HistoryStore.
pub struct SqlxHistoryStore {
    pool: SqlitePool,
}

impl SqlxHistoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Most recent entries first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<DownloadHistoryDbModel>> {
        let rows = sqlx::query_as::<_, DownloadHistoryDbModel>(
            "SELECT * FROM download_history ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Whether a task id has already been recorded for a backend.
    pub async fn exists(&self, downloader: &str, download_id: &str) -> Result<bool> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM download_history WHERE downloader = ? AND download_id = ?",
        )
        .bind(downloader)
        .bind(download_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0 > 0)
    }
}

#[async_trait]
impl HistoryStore for SqlxHistoryStore {
    async fn insert(&self, record: &DownloadRecord) -> Result<()> {
        let row = NewHistoryRow::from(record);
        sqlx::query(
            r#"
            INSERT INTO download_history
                (title, media_kind, year, enclosure, page_url, site, downloader, download_id, save_dir, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.title)
        .bind(row.media_kind)
        .bind(row.year)
        .bind(row.enclosure)
        .bind(row.page_url)
        .bind(row.site)
        .bind(row.downloader)
        .bind(row.download_id)
        .bind(row.save_dir)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// In-memory implementation of HistoryStore.
#[derive(Default)]
pub struct MemoryHistoryStore {
    records: Mutex<Vec<DownloadRecord>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<DownloadRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn insert(&self, record: &DownloadRecord) -> Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}
