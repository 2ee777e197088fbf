//! In-process fakes for backend adapters.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::adapter::{
    AddTaskOutcome, AddTaskRequest, AdapterFactory, AdapterFamily, BackendAdapter, BackendType,
    TaskAttributes, TaskInfo, TaskQuery,
};
use super::model::DownloaderProfile;
use crate::database::models::DownloaderDbModel;
use crate::{Error, Result};

/// Adapter that records every call.
pub struct FakeAdapter {
    pub backend_type: BackendType,
    pub family: AdapterFamily,
    pub outcome: Mutex<AddTaskOutcome>,
    pub fail_add: Mutex<Option<String>>,
    pub panic_on_add: AtomicBool,
    pub requests: Mutex<Vec<AddTaskRequest>>,
    pub applied: Mutex<Vec<(String, TaskAttributes)>>,
    pub tag_lookups: Mutex<Vec<String>>,
    pub tasks: Mutex<Vec<TaskInfo>>,
    pub connects: AtomicUsize,
}

impl FakeAdapter {
    pub fn new(backend_type: BackendType, family: AdapterFamily, outcome: AddTaskOutcome) -> Self {
        Self {
            backend_type,
            family,
            outcome: Mutex::new(outcome),
            fail_add: Mutex::new(None),
            panic_on_add: AtomicBool::new(false),
            requests: Mutex::new(Vec::new()),
            applied: Mutex::new(Vec::new()),
            tag_lookups: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
        }
    }

    pub fn last_request(&self) -> Option<AddTaskRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl BackendAdapter for FakeAdapter {
    fn backend_type(&self) -> BackendType {
        self.backend_type
    }

    fn family(&self) -> AdapterFamily {
        self.family
    }

    async fn connect(&self) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn add_task(&self, request: &AddTaskRequest) -> Result<AddTaskOutcome> {
        if self.panic_on_add.load(Ordering::SeqCst) {
            panic!("adapter exploded");
        }
        self.requests.lock().push(request.clone());
        let failure = self.fail_add.lock().clone();
        if let Some(reason) = failure {
            return Err(Error::backend(self.backend_type.as_str(), reason));
        }
        Ok(self.outcome.lock().clone())
    }

    async fn apply_attributes(&self, task_id: &str, attributes: &TaskAttributes) -> Result<()> {
        self.applied
            .lock()
            .push((task_id.to_string(), attributes.clone()));
        Ok(())
    }

    /// Finds only tasks submitted with `tag`.
    async fn find_task_by_tag(&self, tag: &str) -> Result<Option<String>> {
        self.tag_lookups.lock().push(tag.to_string());
        let requests = self.requests.lock();
        Ok(requests
            .iter()
            .position(|request| request.tags.iter().any(|t| t == tag))
            .map(|index| format!("hash-{index}")))
    }

    async fn query_tasks(&self, query: &TaskQuery) -> Result<Vec<TaskInfo>> {
        Ok(self
            .tasks
            .lock()
            .iter()
            .filter(|task| !query.completed_only || task.completed)
            .filter(|task| {
                query
                    .tag
                    .as_ref()
                    .is_none_or(|tag| task.tags.iter().any(|t| t == tag))
            })
            .cloned()
            .collect())
    }
}

/// Factory handing out one shared [`FakeAdapter`] and counting builds.
pub struct FakeFactory {
    pub backend_type: BackendType,
    pub adapter: Arc<FakeAdapter>,
    pub builds: AtomicUsize,
    /// Profiles passed to `build`, in order.
    pub built_from: Mutex<Vec<DownloaderProfile>>,
}

impl FakeFactory {
    pub fn new(adapter: Arc<FakeAdapter>) -> Self {
        Self {
            backend_type: adapter.backend_type,
            adapter,
            builds: AtomicUsize::new(0),
            built_from: Mutex::new(Vec::new()),
        }
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl AdapterFactory for FakeFactory {
    fn backend_type(&self) -> BackendType {
        self.backend_type
    }

    fn build(&self, profile: &DownloaderProfile) -> Result<Arc<dyn BackendAdapter>> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        self.built_from.lock().push(profile.clone());
        Ok(self.adapter.clone())
    }
}

/// A persisted backend row.
pub fn downloader_row(id: i64, name: &str, backend_type: &str) -> DownloaderDbModel {
    DownloaderDbModel {
        id,
        name: name.to_string(),
        backend_type: backend_type.to_string(),
        enabled: true,
        transfer: false,
        only_tagged: false,
        match_path: false,
        transfer_mode: None,
        config: r#"{"host": "127.0.0.1", "port": 9091}"#.to_string(),
        download_dir: "[]".to_string(),
    }
}

pub fn task(id: &str, save_path: &str, tags: &[&str], completed: bool) -> TaskInfo {
    TaskInfo {
        id: id.to_string(),
        name: format!("{id}.mkv"),
        save_path: save_path.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        progress: if completed { 1.0 } else { 0.5 },
        completed,
    }
}
