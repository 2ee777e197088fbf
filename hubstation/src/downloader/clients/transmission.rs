//! Transmission RPC client.
//!
//! `torrent-add` answers with the added torrent's detail, but cannot set
//! labels or limits, so a `torrent-set` call follows each submission.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tracing::{debug, info};
use url::Url;

use super::{ConnectionParams, endpoint};
use crate::downloader::adapter::{
    AdapterFactory, AdapterFamily, AddTaskOutcome, AddTaskRequest, BackendAdapter, BackendType,
    TaskAttributes, TaskInfo, TaskQuery,
};
use crate::downloader::model::DownloaderProfile;
use crate::payload::PayloadContent;
use crate::utils::http_client::{ProxySetting, build_client};
use crate::{Error, Result};

const SESSION_HEADER: &str = "X-Transmission-Session-Id";
const BACKEND: &str = "transmission";
const TASK_FIELDS: &[&str] = &["hashString", "name", "downloadDir", "labels", "percentDone"];

pub struct TransmissionAdapter {
    client: reqwest::Client,
    rpc_url: Url,
    credentials: Option<(String, String)>,
    session_id: Mutex<Option<String>>,
}

impl TransmissionAdapter {
    pub fn new(params: &ConnectionParams, request_timeout: Duration) -> Result<Self> {
        let base = params.base_url(BACKEND)?;
        let client = build_client(None, &ProxySetting::Disabled, request_timeout)?;
        Ok(Self {
            client,
            rpc_url: endpoint(&base, "transmission/rpc"),
            credentials: params
                .credentials()
                .map(|(u, p)| (u.to_string(), p.to_string())),
            session_id: Mutex::new(None),
        })
    }

    /// Call an RPC method, refreshing the CSRF session id once on 409.
    async fn call(&self, method: &str, arguments: Value) -> Result<Value> {
        let body = json!({ "method": method, "arguments": arguments });

        for _ in 0..2 {
            let mut request = self.client.post(self.rpc_url.clone()).json(&body);
            if let Some((user, pass)) = &self.credentials {
                request = request.basic_auth(user, Some(pass));
            }
            let session = self.session_id.lock().clone();
            if let Some(session) = session {
                request = request.header(SESSION_HEADER, session);
            }

            let response = request.send().await?;
            if response.status() == StatusCode::CONFLICT {
                let session = response
                    .headers()
                    .get(SESSION_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                debug!("Transmission session id refreshed");
                *self.session_id.lock() = session;
                continue;
            }
            if response.status() == StatusCode::UNAUTHORIZED {
                return Err(Error::backend(BACKEND, "authentication failed"));
            }

            let reply: Value = response.error_for_status()?.json().await?;
            let result = reply.get("result").and_then(Value::as_str).unwrap_or_default();
            if result != "success" {
                return Err(Error::backend(BACKEND, format!("{method}: {result}")));
            }
            return Ok(reply.get("arguments").cloned().unwrap_or(Value::Null));
        }

        Err(Error::backend(BACKEND, "could not obtain a session id"))
    }
}

fn parse_task(value: &Value) -> Option<TaskInfo> {
    let id = value.get("hashString")?.as_str()?.to_string();
    let progress = value.get("percentDone").and_then(Value::as_f64).unwrap_or(0.0);
    Some(TaskInfo {
        id,
        name: value
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        save_path: value
            .get("downloadDir")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        tags: value
            .get("labels")
            .and_then(Value::as_array)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        progress,
        completed: progress >= 1.0,
    })
}

#[async_trait]
impl BackendAdapter for TransmissionAdapter {
    fn backend_type(&self) -> BackendType {
        BackendType::Transmission
    }

    fn family(&self) -> AdapterFamily {
        AdapterFamily::DetailThenApply
    }

    async fn connect(&self) -> Result<()> {
        self.call("session-get", json!({ "fields": ["version"] })).await?;
        Ok(())
    }

    async fn add_task(&self, request: &AddTaskRequest) -> Result<AddTaskOutcome> {
        let mut arguments = json!({ "paused": request.paused });
        match &request.content {
            PayloadContent::Magnet(uri) => arguments["filename"] = json!(uri),
            PayloadContent::Torrent(_) => {
                arguments["metainfo"] = json!(request.content.metainfo_base64())
            }
        }
        if let Some(dir) = request.save_dir.as_deref().filter(|d| !d.is_empty()) {
            arguments["download-dir"] = json!(dir);
        }
        if let Some(cookie) = request.cookie.as_deref().filter(|c| !c.is_empty()) {
            arguments["cookies"] = json!(cookie);
        }

        let reply = self.call("torrent-add", arguments).await?;
        if reply.get("torrent-duplicate").is_some() {
            info!("Transmission reports the torrent already exists");
            return Ok(AddTaskOutcome::Rejected);
        }
        Ok(reply
            .get("torrent-added")
            .and_then(|added| added.get("hashString"))
            .and_then(Value::as_str)
            .map(|hash| AddTaskOutcome::Detail {
                task_id: hash.to_string(),
            })
            .unwrap_or(AddTaskOutcome::Rejected))
    }

    async fn apply_attributes(&self, task_id: &str, attributes: &TaskAttributes) -> Result<()> {
        let mut arguments = json!({
            "ids": [task_id],
            "uploadLimited": attributes.upload_limit > 0,
            "downloadLimited": attributes.download_limit > 0,
        });
        if !attributes.tags.is_empty() {
            arguments["labels"] = json!(attributes.tags);
        }
        if attributes.upload_limit > 0 {
            arguments["uploadLimit"] = json!(attributes.upload_limit);
        }
        if attributes.download_limit > 0 {
            arguments["downloadLimit"] = json!(attributes.download_limit);
        }
        if attributes.ratio_limit > 0.0 {
            arguments["seedRatioLimit"] = json!(attributes.ratio_limit);
            arguments["seedRatioMode"] = json!(1);
        }
        if attributes.seeding_time_limit > 0 {
            arguments["seedIdleLimit"] = json!(attributes.seeding_time_limit);
            arguments["seedIdleMode"] = json!(1);
        }
        self.call("torrent-set", arguments).await?;
        Ok(())
    }

    async fn query_tasks(&self, query: &TaskQuery) -> Result<Vec<TaskInfo>> {
        let mut arguments = json!({ "fields": TASK_FIELDS });
        if !query.ids.is_empty() {
            arguments["ids"] = json!(query.ids);
        }
        let reply = self.call("torrent-get", arguments).await?;
        let tasks = reply
            .get("torrents")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(parse_task).collect::<Vec<_>>())
            .unwrap_or_default();

        Ok(tasks
            .into_iter()
            .filter(|task| !query.completed_only || task.completed)
            .filter(|task| {
                query
                    .tag
                    .as_ref()
                    .is_none_or(|tag| task.tags.iter().any(|t| t == tag))
            })
            .collect())
    }
}

pub struct TransmissionFactory {
    request_timeout: Duration,
}

impl TransmissionFactory {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

impl AdapterFactory for TransmissionFactory {
    fn backend_type(&self) -> BackendType {
        BackendType::Transmission
    }

    fn build(&self, profile: &DownloaderProfile) -> Result<Arc<dyn BackendAdapter>> {
        let params = ConnectionParams::from_value(BACKEND, &profile.connection)?;
        Ok(Arc::new(TransmissionAdapter::new(&params, self.request_timeout)?))
    }
}
