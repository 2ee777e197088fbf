//! Database models.
//!
//! These models map directly to the database schema. JSON columns are kept
//! as text here and parsed by the components that consume them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::downloader::model::DownloadRecord;

/// Backend connection profile row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct DownloaderDbModel {
    pub id: i64,
    pub name: String,
    /// Type tag, e.g. `qbittorrent`.
    #[sqlx(rename = "type")]
    pub backend_type: String,
    pub enabled: bool,
    /// Monitor completed tasks.
    pub transfer: bool,
    /// Only pick up tasks carrying the service tag.
    pub only_tagged: bool,
    /// Only pick up tasks saved under a configured directory.
    pub match_path: bool,
    pub transfer_mode: Option<String>,
    /// JSON object of connection parameters.
    pub config: String,
    /// JSON array of directory rules.
    pub download_dir: String,
}

/// Download setting row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct DownloadSettingDbModel {
    pub id: i64,
    pub name: String,
    pub category: Option<String>,
    /// `;`-separated.
    pub tags: Option<String>,
    pub is_paused: bool,
    pub upload_limit: i64,
    pub download_limit: i64,
    /// Percent; 7550 means 75.50.
    pub ratio_limit: i64,
    pub seeding_time_limit: i64,
    pub downloader: Option<String>,
}

/// Download history row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DownloadHistoryDbModel {
    pub id: i64,
    pub title: String,
    pub media_kind: String,
    pub year: Option<String>,
    pub enclosure: Option<String>,
    pub page_url: Option<String>,
    pub site: Option<String>,
    pub downloader: String,
    pub download_id: Option<String>,
    pub save_dir: Option<String>,
    pub created_at: String,
}

impl DownloadHistoryDbModel {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.created_at)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Column values for inserting a [`DownloadRecord`].
pub(crate) struct NewHistoryRow<'a> {
    pub title: &'a str,
    pub media_kind: &'static str,
    pub year: Option<&'a str>,
    pub enclosure: Option<&'a str>,
    pub page_url: Option<&'a str>,
    pub site: Option<&'a str>,
    pub downloader: &'a str,
    pub download_id: Option<&'a str>,
    pub save_dir: Option<String>,
    pub created_at: String,
}

impl<'a> From<&'a DownloadRecord> for NewHistoryRow<'a> {
    fn from(record: &'a DownloadRecord) -> Self {
        Self {
            title: &record.media.title,
            media_kind: record.media.kind.as_str(),
            year: record.media.year.as_deref(),
            enclosure: record.media.enclosure.as_deref(),
            page_url: record.media.page_url.as_deref(),
            site: record.media.site.as_deref(),
            downloader: &record.backend_id,
            download_id: record.backend_task_id.as_deref(),
            save_dir: record
                .save_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            created_at: record.created_at.to_rfc3339(),
        }
    }
}
