//! Backend adapter trait and related types.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::model::DownloaderProfile;
use crate::Result;
use crate::payload::PayloadContent;

/// Type of download backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    Transmission,
    #[serde(rename = "qbittorrent")]
    QBittorrent,
    Aria2,
}

impl BackendType {
    /// Parse a declared type tag. Accepts short aliases.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "transmission" | "tr" => Some(Self::Transmission),
            "qbittorrent" | "qb" => Some(Self::QBittorrent),
            "aria2" => Some(Self::Aria2),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transmission => "transmission",
            Self::QBittorrent => "qbittorrent",
            Self::Aria2 => "aria2",
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a backend reports the identifier of a task it accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterFamily {
    /// The add call returns a task detail carrying the id. Tags and limits
    /// need a second call.
    DetailThenApply,
    /// The add call returns no id. The id is recovered by looking the task up
    /// by a tag attached at submission.
    CorrelationTag,
    /// The add call returns the id or a success flag.
    Direct,
}

/// Everything a backend needs to create a task.
#[derive(Debug, Clone)]
pub struct AddTaskRequest {
    pub content: PayloadContent,
    pub paused: bool,
    pub save_dir: Option<String>,
    pub tags: Vec<String>,
    pub category: Option<String>,
    pub upload_limit: u64,
    pub download_limit: u64,
    pub ratio_limit: f64,
    pub seeding_time_limit: u64,
    /// Site cookie, for backends that fetch URLs themselves.
    pub cookie: Option<String>,
}

impl AddTaskRequest {
    pub fn attributes(&self) -> TaskAttributes {
        TaskAttributes {
            tags: self.tags.clone(),
            upload_limit: self.upload_limit,
            download_limit: self.download_limit,
            ratio_limit: self.ratio_limit,
            seeding_time_limit: self.seeding_time_limit,
        }
    }
}

/// Result of an add call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddTaskOutcome {
    /// Task detail with the native id.
    Detail { task_id: String },
    /// Native id returned directly.
    TaskId(String),
    /// Accepted, but no id was returned.
    Accepted,
    /// Not accepted, usually because the task already exists.
    Rejected,
}

impl AddTaskOutcome {
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::Detail { task_id } | Self::TaskId(task_id) => Some(task_id),
            Self::Accepted | Self::Rejected => None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

/// Attributes applied to an existing task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskAttributes {
    pub tags: Vec<String>,
    pub upload_limit: u64,
    pub download_limit: u64,
    pub ratio_limit: f64,
    pub seeding_time_limit: u64,
}

/// Filter for listing tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskQuery {
    pub completed_only: bool,
    pub tag: Option<String>,
    pub ids: Vec<String>,
}

/// A task as reported by a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskInfo {
    pub id: String,
    pub name: String,
    pub save_path: String,
    pub tags: Vec<String>,
    /// 0.0 to 1.0.
    pub progress: f64,
    pub completed: bool,
}

/// A connection to one backend instance.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    fn backend_type(&self) -> BackendType;

    fn family(&self) -> AdapterFamily;

    /// Establish or verify the session. The registry calls this in the
    /// background once after building the adapter.
    async fn connect(&self) -> Result<()>;

    async fn add_task(&self, request: &AddTaskRequest) -> Result<AddTaskOutcome>;

    /// Apply attributes the add call could not set.
    async fn apply_attributes(&self, _task_id: &str, _attributes: &TaskAttributes) -> Result<()> {
        Ok(())
    }

    /// Id of the task carrying `tag`, if any.
    async fn find_task_by_tag(&self, tag: &str) -> Result<Option<String>> {
        let tasks = self
            .query_tasks(&TaskQuery {
                tag: Some(tag.to_string()),
                ..TaskQuery::default()
            })
            .await?;
        Ok(tasks.into_iter().next().map(|task| task.id))
    }

    async fn query_tasks(&self, query: &TaskQuery) -> Result<Vec<TaskInfo>>;
}

/// Builds adapters for one backend type.
pub trait AdapterFactory: Send + Sync {
    fn backend_type(&self) -> BackendType;

    /// Whether this factory handles the declared type tag.
    fn matches(&self, type_tag: &str) -> bool {
        BackendType::from_str(type_tag) == Some(self.backend_type())
    }

    fn build(&self, profile: &DownloaderProfile) -> Result<Arc<dyn BackendAdapter>>;
}
