//! aria2 JSON-RPC client.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
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

const BACKEND: &str = "aria2";
const STATUS_KEYS: &[&str] = &["gid", "status", "dir", "files", "completedLength", "totalLength", "bittorrent"];
const PAGE_SIZE: u64 = 1000;

pub struct Aria2Adapter {
    client: reqwest::Client,
    rpc_url: Url,
    token: Option<String>,
    next_id: AtomicU64,
}

impl Aria2Adapter {
    pub fn new(params: &ConnectionParams, request_timeout: Duration) -> Result<Self> {
        let base = params.base_url(BACKEND)?;
        let client = build_client(None, &ProxySetting::Disabled, request_timeout)?;
        Ok(Self {
            client,
            rpc_url: endpoint(&base, "jsonrpc"),
            token: params
                .secret
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(|s| format!("token:{s}")),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let mut full = Vec::with_capacity(params.len() + 1);
        if let Some(token) = &self.token {
            full.push(json!(token));
        }
        full.extend(params);

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id.to_string(),
            "method": method,
            "params": full,
        });
        let reply: Value = self
            .client
            .post(self.rpc_url.clone())
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = reply.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(Error::backend(BACKEND, format!("{method}: {message}")));
        }
        Ok(reply.get("result").cloned().unwrap_or(Value::Null))
    }
}

fn parse_status(value: &Value) -> Option<TaskInfo> {
    let id = value.get("gid")?.as_str()?.to_string();
    let number = |key: &str| -> f64 {
        value
            .get(key)
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(0.0)
    };
    let total = number("totalLength");
    let progress = if total > 0.0 {
        number("completedLength") / total
    } else {
        0.0
    };
    let name = value
        .pointer("/bittorrent/info/name")
        .and_then(Value::as_str)
        .or_else(|| {
            value
                .pointer("/files/0/path")
                .and_then(Value::as_str)
                .and_then(|p| p.rsplit('/').next())
        })
        .unwrap_or_default()
        .to_string();

    Some(TaskInfo {
        id,
        name,
        save_path: value
            .get("dir")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        tags: Vec::new(),
        progress,
        completed: value.get("status").and_then(Value::as_str) == Some("complete"),
    })
}

#[async_trait]
impl BackendAdapter for Aria2Adapter {
    fn backend_type(&self) -> BackendType {
        BackendType::Aria2
    }

    fn family(&self) -> AdapterFamily {
        AdapterFamily::Direct
    }

    async fn connect(&self) -> Result<()> {
        self.call("aria2.getVersion", Vec::new()).await?;
        Ok(())
    }

    async fn add_task(&self, request: &AddTaskRequest) -> Result<AddTaskOutcome> {
        let mut options = json!({ "pause": request.paused.to_string() });
        if let Some(dir) = request.save_dir.as_deref().filter(|d| !d.is_empty()) {
            options["dir"] = json!(dir);
        }
        if request.upload_limit > 0 {
            options["max-upload-limit"] = json!(format!("{}K", request.upload_limit));
        }
        if request.download_limit > 0 {
            options["max-download-limit"] = json!(format!("{}K", request.download_limit));
        }
        if request.ratio_limit > 0.0 {
            options["seed-ratio"] = json!(request.ratio_limit.to_string());
        }

        let result = match &request.content {
            PayloadContent::Magnet(uri) => {
                self.call("aria2.addUri", vec![json!([uri]), options]).await?
            }
            PayloadContent::Torrent(_) => {
                let metainfo = request.content.metainfo_base64().unwrap_or_default();
                self.call("aria2.addTorrent", vec![json!(metainfo), json!([]), options])
                    .await?
            }
        };

        Ok(match result.as_str() {
            Some(gid) if !gid.is_empty() => AddTaskOutcome::TaskId(gid.to_string()),
            _ => AddTaskOutcome::Rejected,
        })
    }

    async fn query_tasks(&self, query: &TaskQuery) -> Result<Vec<TaskInfo>> {
        // aria2 has no tags; tag filters match nothing.
        if query.tag.is_some() {
            return Ok(Vec::new());
        }

        let mut statuses = Vec::new();
        let stopped = self
            .call("aria2.tellStopped", vec![json!(0), json!(PAGE_SIZE), json!(STATUS_KEYS)])
            .await?;
        statuses.extend(stopped.as_array().cloned().unwrap_or_default());
        if !query.completed_only {
            let active = self.call("aria2.tellActive", vec![json!(STATUS_KEYS)]).await?;
            statuses.extend(active.as_array().cloned().unwrap_or_default());
        }

        Ok(statuses
            .iter()
            .filter_map(parse_status)
            .filter(|task| !query.completed_only || task.completed)
            .filter(|task| query.ids.is_empty() || query.ids.contains(&task.id))
            .collect())
    }
}

pub struct Aria2Factory {
    request_timeout: Duration,
}

impl Aria2Factory {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

impl AdapterFactory for Aria2Factory {
    fn backend_type(&self) -> BackendType {
        BackendType::Aria2
    }

    fn build(&self, profile: &DownloaderProfile) -> Result<Arc<dyn BackendAdapter>> {
        let params = ConnectionParams::from_value(BACKEND, &profile.connection)?;
        Ok(Arc::new(Aria2Adapter::new(&params, self.request_timeout)?))
    }
}
