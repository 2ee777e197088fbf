//! qBittorrent Web API client.
//!
//! `torrents/add` only answers "Ok." or "Fails.", so callers attach a unique
//! tag and look the task up by that tag afterwards.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use reqwest::header::{COOKIE, REFERER, SET_COOKIE};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::{ConnectionParams, endpoint};
use crate::downloader::adapter::{
    AdapterFactory, AdapterFamily, AddTaskOutcome, AddTaskRequest, BackendAdapter, BackendType,
    TaskInfo, TaskQuery,
};
use crate::downloader::model::DownloaderProfile;
use crate::payload::PayloadContent;
use crate::utils::http_client::{ProxySetting, build_client};
use crate::{Error, Result};

const BACKEND: &str = "qbittorrent";

pub struct QBittorrentAdapter {
    client: reqwest::Client,
    base: Url,
    credentials: Option<(String, String)>,
    sid: Mutex<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct RawTorrent {
    hash: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    save_path: String,
    #[serde(default)]
    tags: String,
    #[serde(default)]
    progress: f64,
    #[serde(default)]
    state: String,
}

impl From<RawTorrent> for TaskInfo {
    fn from(raw: RawTorrent) -> Self {
        let completed = raw.progress >= 1.0
            || matches!(
                raw.state.as_str(),
                "uploading" | "stalledUP" | "pausedUP" | "stoppedUP" | "queuedUP" | "forcedUP"
            );
        TaskInfo {
            id: raw.hash,
            name: raw.name,
            save_path: raw.save_path,
            tags: raw
                .tags
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
            progress: raw.progress,
            completed,
        }
    }
}

impl QBittorrentAdapter {
    pub fn new(params: &ConnectionParams, request_timeout: Duration) -> Result<Self> {
        let base = params.base_url(BACKEND)?;
        let client = build_client(None, &ProxySetting::Disabled, request_timeout)?;
        Ok(Self {
            client,
            base,
            credentials: params
                .credentials()
                .map(|(u, p)| (u.to_string(), p.to_string())),
            sid: Mutex::new(None),
        })
    }

    async fn login(&self) -> Result<()> {
        let (user, pass) = self.credentials.clone().unwrap_or_default();
        let response = self
            .client
            .post(endpoint(&self.base, "api/v2/auth/login"))
            .header(REFERER, self.base.as_str())
            .form(&[("username", user), ("password", pass)])
            .send()
            .await?;

        let sid = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|cookie| {
                cookie
                    .split(';')
                    .next()
                    .and_then(|pair| pair.trim().strip_prefix("SID="))
                    .map(str::to_string)
            });
        let body = response.error_for_status()?.text().await?;
        if body.trim() != "Ok." {
            return Err(Error::backend(BACKEND, format!("login rejected: {}", body.trim())));
        }

        debug!("qBittorrent login succeeded");
        *self.sid.lock() = sid;
        Ok(())
    }

    /// Send a request built by `build`, logging in first when there is no
    /// session and once more when the session has expired.
    async fn send<F>(&self, build: F) -> Result<reqwest::Response>
    where
        F: Fn(&reqwest::Client) -> Result<reqwest::RequestBuilder>,
    {
        let logged_in = self.sid.lock().is_some();
        if !logged_in {
            self.login().await?;
        }

        for attempt in 0..2 {
            let mut request = build(&self.client)?;
            let sid = self.sid.lock().clone();
            if let Some(sid) = sid {
                request = request.header(COOKIE, format!("SID={sid}"));
            }
            let response = request.send().await?;
            if response.status() == StatusCode::FORBIDDEN && attempt == 0 {
                warn!("qBittorrent session expired, logging in again");
                self.login().await?;
                continue;
            }
            return Ok(response.error_for_status()?);
        }

        Err(Error::backend(BACKEND, "authentication failed"))
    }

    fn add_form(request: &AddTaskRequest) -> Result<Form> {
        let mut form = Form::new()
            .text("paused", request.paused.to_string())
            .text("stopped", request.paused.to_string())
            .text("contentLayout", "Original");

        form = match &request.content {
            PayloadContent::Magnet(uri) => form.text("urls", uri.clone()),
            PayloadContent::Torrent(bytes) => form.part(
                "torrents",
                Part::bytes(bytes.clone())
                    .file_name("file.torrent")
                    .mime_str("application/x-bittorrent")?,
            ),
        };
        if let Some(dir) = request.save_dir.as_deref().filter(|d| !d.is_empty()) {
            form = form.text("savepath", dir.to_string());
        }
        if let Some(category) = request.category.as_deref().filter(|c| !c.is_empty()) {
            form = form.text("category", category.to_string());
        }
        if !request.tags.is_empty() {
            form = form.text("tags", request.tags.join(","));
        }
        if request.upload_limit > 0 {
            form = form.text("upLimit", bytes_per_sec(request.upload_limit).to_string());
        }
        if request.download_limit > 0 {
            form = form.text("dlLimit", bytes_per_sec(request.download_limit).to_string());
        }
        if request.ratio_limit > 0.0 {
            form = form.text("ratioLimit", request.ratio_limit.to_string());
        }
        if request.seeding_time_limit > 0 {
            form = form.text("seedingTimeLimit", request.seeding_time_limit.to_string());
        }
        if let Some(cookie) = request.cookie.as_deref().filter(|c| !c.is_empty()) {
            form = form.text("cookie", cookie.to_string());
        }
        Ok(form)
    }
}

#[async_trait]
impl BackendAdapter for QBittorrentAdapter {
    fn backend_type(&self) -> BackendType {
        BackendType::QBittorrent
    }

    fn family(&self) -> AdapterFamily {
        AdapterFamily::CorrelationTag
    }

    async fn connect(&self) -> Result<()> {
        self.login().await
    }

    async fn add_task(&self, request: &AddTaskRequest) -> Result<AddTaskOutcome> {
        let url = endpoint(&self.base, "api/v2/torrents/add");
        let response = self
            .send(|client| Ok(client.post(url.clone()).multipart(Self::add_form(request)?)))
            .await?;
        let body = response.text().await?;
        if body.trim() == "Ok." {
            Ok(AddTaskOutcome::Accepted)
        } else {
            debug!(reply = body.trim(), "qBittorrent did not accept the torrent");
            Ok(AddTaskOutcome::Rejected)
        }
    }

    async fn find_task_by_tag(&self, tag: &str) -> Result<Option<String>> {
        // The add call returns before the torrent is listed.
        for delay_ms in [0u64, 500, 1000, 2000] {
            if delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            let tasks = self
                .query_tasks(&TaskQuery {
                    tag: Some(tag.to_string()),
                    ..TaskQuery::default()
                })
                .await?;
            if let Some(task) = tasks.into_iter().next() {
                return Ok(Some(task.id));
            }
        }
        Ok(None)
    }

    async fn query_tasks(&self, query: &TaskQuery) -> Result<Vec<TaskInfo>> {
        let mut url = endpoint(&self.base, "api/v2/torrents/info");
        {
            let mut pairs = url.query_pairs_mut();
            if query.completed_only {
                pairs.append_pair("filter", "completed");
            }
            if let Some(tag) = &query.tag {
                pairs.append_pair("tag", tag);
            }
            if !query.ids.is_empty() {
                pairs.append_pair("hashes", &query.ids.join("|"));
            }
        }
        let response = self.send(|client| Ok(client.get(url.clone()))).await?;
        let raw: Vec<RawTorrent> = response.json().await?;
        Ok(raw.into_iter().map(TaskInfo::from).collect())
    }
}

/// Limits are stored in KiB/s; the Web API takes bytes/s.
fn bytes_per_sec(kib: u64) -> u64 {
    kib.saturating_mul(1024)
}

pub struct QBittorrentFactory {
    request_timeout: Duration,
}

impl QBittorrentFactory {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

impl AdapterFactory for QBittorrentFactory {
    fn backend_type(&self) -> BackendType {
        BackendType::QBittorrent
    }

    fn build(&self, profile: &DownloaderProfile) -> Result<Arc<dyn BackendAdapter>> {
        let params = ConnectionParams::from_value(BACKEND, &profile.connection)?;
        Ok(Arc::new(QBittorrentAdapter::new(&params, self.request_timeout)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_torrent_conversion() {
        let raw: RawTorrent = serde_json::from_value(json!({
            "hash": "deadbeef",
            "name": "Show",
            "save_path": "/dl/tv",
            "tags": "HS, HSab12c",
            "progress": 0.5,
            "state": "downloading"
        }))
        .unwrap();
        let task = TaskInfo::from(raw);

        assert_eq!(task.tags, vec!["HS", "HSab12c"]);
        assert!(!task.completed);
    }

    #[test]
    fn test_seeding_state_is_completed() {
        let raw: RawTorrent =
            serde_json::from_value(json!({"hash": "x", "state": "stalledUP", "progress": 0.99}))
                .unwrap();
        assert!(TaskInfo::from(raw).completed);
    }

    #[test]
    fn test_limit_conversion_saturates() {
        assert_eq!(bytes_per_sec(5), 5120);
        assert_eq!(bytes_per_sec(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_family_is_correlation_tag() {
        let params =
            ConnectionParams::from_value(BACKEND, &json!({"host": "127.0.0.1", "port": 8080})).unwrap();
        let adapter = QBittorrentAdapter::new(&params, Duration::from_secs(5)).unwrap();
        assert_eq!(adapter.family(), AdapterFamily::CorrelationTag);
    }
}
