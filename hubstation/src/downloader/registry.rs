//! Downloader registry.
//!
//! Holds the backend profiles, the set of monitored backends and the merged
//! download settings. Everything is rebuilt from scratch by [`init_config`],
//! which also restarts the transfer service.
//!
//! [`init_config`]: DownloaderRegistry::init_config

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::adapter::{BackendAdapter, TaskQuery};
use super::factory::AdapterFactoryTable;
use super::model::{DirectoryChoice, DownloadSettingProfile, DownloaderProfile, MediaInfo};
use super::transfer::{CompletedTask, CompletedTaskSink, HandedOff};
use crate::Result;
use crate::config::ConfigStore;
use crate::constants::{DEFAULT_SETTING_ID, PT_TAG, TRANSFER_INTERVAL};
use crate::database::models::{DownloadSettingDbModel, DownloaderDbModel};
use crate::database::repositories::ProfileRepository;
use crate::registry::Reconfigurable;
use crate::scheduler::{TransferJob, TransferScheduler};

/// Everything derived from one reconfiguration. Adapters live here so that a
/// reload replaces profiles and cached adapters in one swap.
#[derive(Default)]
struct RegistryState {
    /// In row order.
    downloaders: Vec<DownloaderProfile>,
    monitored: Vec<String>,
    /// The reserved default first, then rows in order.
    settings: Vec<DownloadSettingProfile>,
    download_order: Vec<String>,
    transfer_interval: Duration,
    /// Built lazily from `downloaders`.
    adapters: DashMap<String, Arc<dyn BackendAdapter>>,
}

impl RegistryState {
    fn downloader(&self, id: &str) -> Option<&DownloaderProfile> {
        self.downloaders.iter().find(|d| d.id == id)
    }
}

pub struct DownloaderRegistry {
    config: Arc<ConfigStore>,
    repository: Arc<dyn ProfileRepository>,
    factories: Arc<AdapterFactoryTable>,
    sink: Arc<dyn CompletedTaskSink>,
    scheduler: TransferScheduler,
    state: RwLock<Arc<RegistryState>>,
    handed_off: HandedOff,
    self_ref: Weak<Self>,
}

impl DownloaderRegistry {
    /// Create an empty registry. Call [`init_config`](Self::init_config)
    /// to load profiles.
    pub fn new(
        config: Arc<ConfigStore>,
        repository: Arc<dyn ProfileRepository>,
        factories: Arc<AdapterFactoryTable>,
        sink: Arc<dyn CompletedTaskSink>,
        token: CancellationToken,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            config,
            repository,
            factories,
            sink,
            scheduler: TransferScheduler::new(token),
            state: RwLock::new(Arc::new(RegistryState {
                transfer_interval: TRANSFER_INTERVAL,
                ..RegistryState::default()
            })),
            handed_off: HandedOff::default(),
            self_ref: self_ref.clone(),
        })
    }

    /// Rebuild every profile and adapter from the repository and the current
    /// configuration, then restart the transfer service.
    pub async fn init_config(&self) -> Result<()> {
        let mut downloaders = Vec::new();
        let mut monitored = Vec::new();
        for row in self.repository.list_downloaders().await? {
            let Some(row) = row else {
                continue;
            };
            let profile = downloader_profile(row);
            if profile.monitor_enabled {
                if profile.enabled {
                    debug!(
                        downloader = %profile.name,
                        tag_isolation = profile.tag_isolation,
                        path_isolation = profile.path_isolation,
                        "Monitoring downloader"
                    );
                    monitored.push(profile.id.clone());
                } else {
                    info!(downloader = %profile.name, "Downloader not monitored: downloader is disabled");
                }
            }
            downloaders.push(profile);
        }

        let pt = self.config.get("pt");
        let download_order = string_list(pt.get("download_order"));
        let transfer_interval = pt
            .get("transfer_interval")
            .and_then(Value::as_u64)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(TRANSFER_INTERVAL);

        let find = |id: Option<&str>| {
            id.filter(|id| !id.is_empty())
                .and_then(|id| downloaders.iter().find(|d| d.id == id))
        };

        let default_backend = scalar_string(pt.get("default_downloader"));
        let mut settings = vec![DownloadSettingProfile::reserved_default(find(
            default_backend.as_deref(),
        ))];
        for row in self.repository.list_download_settings().await? {
            let backend = find(row.downloader.as_deref());
            if backend.is_none() && row.downloader.as_deref().is_some_and(|id| !id.is_empty()) {
                debug!(
                    setting = %row.name,
                    downloader = ?row.downloader,
                    "Download setting refers to an unknown downloader"
                );
            }
            settings.push(download_setting_profile(row, backend));
        }

        info!(
            downloaders = downloaders.len(),
            monitored = monitored.len(),
            settings = settings.len(),
            "Downloader configuration loaded"
        );
        *self.state.write() = Arc::new(RegistryState {
            downloaders,
            monitored,
            settings,
            download_order,
            transfer_interval,
            adapters: DashMap::new(),
        });

        self.start_service().await;
        Ok(())
    }

    /// (Re)start the transfer service for the monitored backends. A running
    /// service is stopped first; with nothing to monitor it stays stopped.
    pub async fn start_service(&self) -> Option<u64> {
        let state = self.snapshot();
        self.scheduler
            .start(&state.monitored, state.transfer_interval, self.transfer_job())
            .await
    }

    /// Stop the transfer service. Idempotent.
    pub async fn stop_service(&self) {
        self.scheduler.stop().await;
    }

    pub fn scheduler(&self) -> &TransferScheduler {
        &self.scheduler
    }

    fn transfer_job(&self) -> TransferJob {
        let registry = self.self_ref.clone();
        Arc::new(move |downloader_id: String| {
            let registry = registry.clone();
            async move {
                if let Some(registry) = registry.upgrade() {
                    registry.transfer(&downloader_id).await;
                }
            }
            .boxed()
        })
    }

    /// One pass of the transfer job: hand each newly completed task of the
    /// backend to the sink. Returns how many were handed off.
    pub async fn transfer(&self, downloader_id: &str) -> usize {
        let Some(profile) = self.downloader(downloader_id) else {
            return 0;
        };
        let Some(adapter) = self.adapter(downloader_id) else {
            warn!(downloader = %profile.name, "Transfer skipped: no adapter");
            return 0;
        };

        let query = TaskQuery {
            completed_only: true,
            tag: profile.tag_isolation.then(|| PT_TAG.to_string()),
            ids: Vec::new(),
        };
        let tasks = match adapter.query_tasks(&query).await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(downloader = %profile.name, error = %e, "Failed to list completed tasks");
                return 0;
            }
        };

        let listed: HashSet<&str> = tasks.iter().map(|task| task.id.as_str()).collect();
        self.handed_off.prune(downloader_id, &listed);

        let mut handed = 0;
        for task in tasks {
            if !task.completed {
                continue;
            }
            if profile.path_isolation && !profile.owns_path(&task.save_path) {
                continue;
            }
            if !self.handed_off.insert(downloader_id, &task.id) {
                continue;
            }
            let task_id = task.id.clone();
            let local_path = profile
                .visit_dir(&task.save_path)
                .map(|dir| dir.join(&task.name));
            let completed = CompletedTask {
                downloader_id: profile.id.clone(),
                downloader_name: profile.name.clone(),
                transfer_mode: profile.transfer_mode.clone(),
                task,
                local_path,
            };
            match self.sink.handle(completed).await {
                Ok(()) => handed += 1,
                Err(e) => {
                    warn!(downloader = %profile.name, task_id = %task_id, error = %e, "Completed task hand-off failed");
                    self.handed_off.remove(downloader_id, &task_id);
                }
            }
        }
        handed
    }

    /// Adapter for a backend id, built on first use and cached until the next
    /// reconfiguration. `None` when the backend is unknown, disabled, or no
    /// factory can build it.
    ///
    /// A newly built adapter connects in the background; a failed connection
    /// is only logged, the next request retries it.
    pub fn adapter(&self, downloader_id: &str) -> Option<Arc<dyn BackendAdapter>> {
        let state = self.snapshot();
        if let Some(adapter) = state.adapters.get(downloader_id) {
            return Some(adapter.clone());
        }
        let profile = state.downloader(downloader_id)?;
        if !profile.enabled {
            return None;
        }
        match state.adapters.entry(downloader_id.to_string()) {
            Entry::Occupied(entry) => Some(entry.get().clone()),
            Entry::Vacant(entry) => {
                let adapter = self.factories.select(profile)?;
                entry.insert(adapter.clone());
                spawn_connect(profile.name.clone(), adapter.clone());
                Some(adapter)
            }
        }
    }

    pub fn downloader(&self, downloader_id: &str) -> Option<DownloaderProfile> {
        self.snapshot().downloader(downloader_id).cloned()
    }

    pub fn downloaders(&self) -> Vec<DownloaderProfile> {
        self.snapshot().downloaders.clone()
    }

    pub fn monitored_ids(&self) -> Vec<String> {
        self.snapshot().monitored.clone()
    }

    pub fn download_setting(&self, setting_id: &str) -> Option<DownloadSettingProfile> {
        self.snapshot()
            .settings
            .iter()
            .find(|s| s.id == setting_id)
            .cloned()
    }

    pub fn download_settings(&self) -> Vec<DownloadSettingProfile> {
        self.snapshot().settings.clone()
    }

    /// The reserved default setting.
    pub fn default_setting(&self) -> DownloadSettingProfile {
        self.download_setting(DEFAULT_SETTING_ID)
            .unwrap_or_else(|| DownloadSettingProfile::reserved_default(None))
    }

    /// `pt.download_order` as of the last reconfiguration.
    pub fn download_order(&self) -> Vec<String> {
        self.snapshot().download_order.clone()
    }

    pub fn transfer_interval(&self) -> Duration {
        self.snapshot().transfer_interval
    }

    /// Translate a backend-side directory into a locally visible path.
    pub fn visit_dir(&self, downloader_id: &str, dir: &str) -> Option<PathBuf> {
        self.snapshot().downloader(downloader_id)?.visit_dir(dir)
    }

    pub fn directory_for(&self, downloader_id: &str, media: &MediaInfo) -> DirectoryChoice {
        self.snapshot()
            .downloader(downloader_id)
            .map(|d| d.directory_for(media))
            .unwrap_or_default()
    }

    /// Number of adapters built since the last reconfiguration.
    pub fn live_adapters(&self) -> usize {
        self.snapshot().adapters.len()
    }

    fn snapshot(&self) -> Arc<RegistryState> {
        self.state.read().clone()
    }
}

#[async_trait]
impl Reconfigurable for DownloaderRegistry {
    fn component(&self) -> &'static str {
        "downloader_registry"
    }

    async fn reconfigure(&self) -> Result<()> {
        self.init_config().await
    }
}

fn spawn_connect(name: String, adapter: Arc<dyn BackendAdapter>) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        return;
    };
    handle.spawn(async move {
        match adapter.connect().await {
            Ok(()) => debug!(downloader = %name, "Downloader connected"),
            Err(e) => warn!(downloader = %name, error = %e, "Failed to connect to downloader"),
        }
    });
}

fn downloader_profile(row: DownloaderDbModel) -> DownloaderProfile {
    let connection = match serde_json::from_str::<Value>(&row.config) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => Value::Object(Map::new()),
        Err(e) => {
            warn!(downloader = %row.name, error = %e, "Invalid connection config, using empty");
            Value::Object(Map::new())
        }
    };
    let directory_rules = if row.download_dir.trim().is_empty() {
        Vec::new()
    } else {
        match serde_json::from_str(&row.download_dir) {
            Ok(rules) => rules,
            Err(e) => {
                warn!(downloader = %row.name, error = %e, "Invalid directory rules, using none");
                Vec::new()
            }
        }
    };

    DownloaderProfile {
        id: row.id.to_string(),
        name: row.name,
        backend_type: row.backend_type,
        enabled: row.enabled,
        monitor_enabled: row.transfer,
        tag_isolation: row.only_tagged,
        path_isolation: row.match_path,
        transfer_mode: row.transfer_mode.filter(|m| !m.is_empty()),
        connection,
        directory_rules,
    }
}

fn download_setting_profile(
    row: DownloadSettingDbModel,
    backend: Option<&DownloaderProfile>,
) -> DownloadSettingProfile {
    let mut profile = DownloadSettingProfile {
        id: row.id.to_string(),
        name: row.name,
        category: row.category.filter(|c| !c.is_empty()),
        tags: row.tags.unwrap_or_default(),
        paused: row.is_paused,
        upload_limit: row.upload_limit.max(0) as u64,
        download_limit: row.download_limit.max(0) as u64,
        ratio_limit: row.ratio_limit as f64 / 100.0,
        seeding_time_limit: row.seeding_time_limit.max(0) as u64,
        ..DownloadSettingProfile::default()
    };
    profile.bind_backend(backend);
    profile
}

fn scalar_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|v| scalar_string(Some(v))).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repositories::StaticProfileRepository;
    use crate::downloader::adapter::{AdapterFactory, AddTaskOutcome, AdapterFamily, BackendType};
    use crate::downloader::test_support::{FakeAdapter, FakeFactory, downloader_row, task};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct RecordingSink {
        tasks: Mutex<Vec<CompletedTask>>,
    }

    #[async_trait]
    impl CompletedTaskSink for RecordingSink {
        async fn handle(&self, task: CompletedTask) -> Result<()> {
            self.tasks.lock().push(task);
            Ok(())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        repo: Arc<StaticProfileRepository>,
        factory: Arc<FakeFactory>,
        sink: Arc<RecordingSink>,
        registry: Arc<DownloaderRegistry>,
    }

    async fn fixture(yaml: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, yaml).unwrap();
        let store = Arc::new(ConfigStore::new(&path, None));
        store.load().await.unwrap();

        let repo = Arc::new(StaticProfileRepository::default());
        let adapter = Arc::new(FakeAdapter::new(
            BackendType::Transmission,
            AdapterFamily::DetailThenApply,
            AddTaskOutcome::Accepted,
        ));
        let factory = Arc::new(FakeFactory::new(adapter));
        let sink = Arc::new(RecordingSink::default());
        let registry = DownloaderRegistry::new(
            store,
            repo.clone(),
            Arc::new(AdapterFactoryTable::new(vec![
                factory.clone() as Arc<dyn AdapterFactory>,
            ])),
            sink.clone(),
            CancellationToken::new(),
        );
        Fixture {
            _dir: dir,
            repo,
            factory,
            sink,
            registry,
        }
    }

    /// Holds `list_downloaders` open once armed, until released.
    #[derive(Default)]
    struct GatedRepository {
        inner: StaticProfileRepository,
        armed: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl ProfileRepository for GatedRepository {
        async fn list_downloaders(&self) -> Result<Vec<Option<DownloaderDbModel>>> {
            let rows = self.inner.list_downloaders().await?;
            if self.armed.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            Ok(rows)
        }

        async fn list_download_settings(&self) -> Result<Vec<DownloadSettingDbModel>> {
            self.inner.list_download_settings().await
        }
    }

    async fn wait_for(counter: &std::sync::atomic::AtomicUsize, expected: usize) {
        for _ in 0..100 {
            if counter.load(Ordering::SeqCst) == expected {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(counter.load(Ordering::SeqCst), expected);
    }

    fn setting_row(id: i64, downloader: Option<&str>) -> DownloadSettingDbModel {
        DownloadSettingDbModel {
            id,
            name: format!("setting-{id}"),
            category: None,
            tags: Some("a;b".into()),
            is_paused: false,
            upload_limit: 100,
            download_limit: 0,
            ratio_limit: 7550,
            seeding_time_limit: 60,
            downloader: downloader.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_ratio_and_unresolved_backend() {
        let f = fixture("pt:\n  default_downloader: '1'\n").await;
        f.repo
            .set_downloaders(vec![Some(downloader_row(1, "tr", "transmission")), None]);
        f.repo
            .set_download_settings(vec![setting_row(5, Some("1")), setting_row(6, Some("99"))]);

        f.registry.init_config().await.unwrap();

        let resolved = f.registry.download_setting("5").unwrap();
        assert_eq!(resolved.ratio_limit, 75.5);
        assert_eq!(resolved.backend(), Some("1"));
        assert_eq!(resolved.backend_name, "tr");

        let orphan = f.registry.download_setting("6").unwrap();
        assert_eq!(orphan.backend(), None);
        assert_eq!(orphan.backend_name, "");
        assert_eq!(orphan.backend_type, "");

        let default = f.registry.default_setting();
        assert_eq!(default.id, "-1");
        assert_eq!(default.backend(), Some("1"));
        assert_eq!(f.registry.downloaders().len(), 1);
    }

    #[tokio::test]
    async fn test_monitored_set_requires_enabled() {
        let f = fixture("pt:\n  download_order: [2, '1']\n  transfer_interval: 60\n").await;
        let mut watched = downloader_row(1, "a", "tr");
        watched.transfer = true;
        let mut disabled = downloader_row(2, "b", "tr");
        disabled.transfer = true;
        disabled.enabled = false;
        let plain = downloader_row(3, "c", "tr");
        f.repo
            .set_downloaders(vec![Some(watched), Some(disabled), Some(plain)]);

        f.registry.init_config().await.unwrap();

        assert_eq!(f.registry.monitored_ids(), vec!["1"]);
        assert_eq!(f.registry.download_order(), vec!["2", "1"]);
        assert_eq!(f.registry.transfer_interval(), Duration::from_secs(60));
        assert!(f.registry.scheduler().is_running().await);
        f.registry.stop_service().await;
        f.registry.stop_service().await;
        assert!(!f.registry.scheduler().is_running().await);
    }

    #[tokio::test]
    async fn test_empty_monitored_set_stays_stopped() {
        let f = fixture("{}").await;
        f.repo
            .set_downloaders(vec![Some(downloader_row(1, "a", "tr"))]);
        f.registry.init_config().await.unwrap();
        assert!(!f.registry.scheduler().is_running().await);
        assert_eq!(f.registry.transfer_interval(), TRANSFER_INTERVAL);
    }

    #[tokio::test]
    async fn test_adapter_is_built_once_per_reconfiguration() {
        let f = fixture("{}").await;
        let mut disabled = downloader_row(2, "off", "tr");
        disabled.enabled = false;
        f.repo.set_downloaders(vec![
            Some(downloader_row(1, "tr", "transmission")),
            Some(disabled),
            Some(downloader_row(3, "x", "deluge")),
        ]);
        f.registry.init_config().await.unwrap();

        assert!(f.registry.adapter("1").is_some());
        assert!(f.registry.adapter("1").is_some());
        assert_eq!(f.factory.builds(), 1);
        wait_for(&f.factory.adapter.connects, 1).await;
        assert!(f.registry.adapter("2").is_none());
        assert!(f.registry.adapter("3").is_none());
        assert!(f.registry.adapter("404").is_none());
        assert_eq!(f.registry.live_adapters(), 1);

        f.registry.reconfigure().await.unwrap();
        assert_eq!(f.registry.live_adapters(), 0);
        f.registry.adapter("1");
        assert_eq!(f.factory.builds(), 2);
    }

    #[tokio::test]
    async fn test_adapter_built_during_reload_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "{}").unwrap();
        let store = Arc::new(ConfigStore::new(&path, None));
        store.load().await.unwrap();

        let repo = Arc::new(GatedRepository::default());
        let factory = Arc::new(FakeFactory::new(Arc::new(FakeAdapter::new(
            BackendType::Transmission,
            AdapterFamily::DetailThenApply,
            AddTaskOutcome::Accepted,
        ))));
        let registry = DownloaderRegistry::new(
            store,
            repo.clone(),
            Arc::new(AdapterFactoryTable::new(vec![
                factory.clone() as Arc<dyn AdapterFactory>,
            ])),
            Arc::new(RecordingSink::default()),
            CancellationToken::new(),
        );

        let mut row = downloader_row(1, "tr", "transmission");
        row.config = r#"{"host": "old-host"}"#.into();
        repo.inner.set_downloaders(vec![Some(row.clone())]);
        registry.init_config().await.unwrap();

        row.config = r#"{"host": "new-host"}"#.into();
        repo.inner.set_downloaders(vec![Some(row)]);
        repo.armed.store(true, Ordering::SeqCst);
        let reload = tokio::spawn({
            let registry = registry.clone();
            async move { registry.init_config().await }
        });

        repo.entered.notified().await;
        assert!(registry.adapter("1").is_some());
        repo.release.notify_one();
        reload.await.unwrap().unwrap();

        assert_eq!(registry.downloader("1").unwrap().connection["host"], "new-host");
        assert!(registry.adapter("1").is_some());
        let hosts: Vec<String> = factory
            .built_from
            .lock()
            .iter()
            .map(|p| p.connection["host"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(hosts, vec!["old-host", "new-host"]);
    }

    #[tokio::test]
    async fn test_bad_json_columns_become_empty() {
        let f = fixture("{}").await;
        let mut row = downloader_row(1, "tr", "tr");
        row.config = "{not json".into();
        row.download_dir = "also not json".into();
        f.repo.set_downloaders(vec![Some(row)]);

        f.registry.init_config().await.unwrap();

        let profile = f.registry.downloader("1").unwrap();
        assert_eq!(profile.connection, serde_json::json!({}));
        assert!(profile.directory_rules.is_empty());
    }

    #[tokio::test]
    async fn test_transfer_hands_off_new_completed_tasks() {
        let f = fixture("{}").await;
        let mut row = downloader_row(1, "tr", "tr");
        row.only_tagged = true;
        row.match_path = true;
        row.download_dir =
            r#"[{"save_path": "/downloads", "container_path": "/mnt/dl"}]"#.into();
        f.repo.set_downloaders(vec![Some(row)]);
        f.registry.init_config().await.unwrap();

        f.factory.adapter.tasks.lock().extend([
            task("a", "/downloads/movies", &["HS"], true),
            task("b", "/downloads", &["other"], true),
            task("c", "/elsewhere", &["HS"], true),
            task("d", "/downloads", &["HS"], false),
        ]);

        assert_eq!(f.registry.transfer("1").await, 1);
        assert_eq!(f.registry.transfer("1").await, 0);
        assert_eq!(f.registry.handed_off.len(), 1);

        let handed = f.sink.tasks.lock();
        assert_eq!(handed.len(), 1);
        assert_eq!(handed[0].task.id, "a");
        assert_eq!(
            handed[0].local_path,
            Some(PathBuf::from("/mnt/dl/movies/a.mkv"))
        );
        drop(handed);

        // Removed from the backend: forgotten.
        f.factory.adapter.tasks.lock().clear();
        assert_eq!(f.registry.transfer("1").await, 0);
        assert_eq!(f.registry.handed_off.len(), 0);
    }

    #[tokio::test]
    async fn test_visit_dir_and_directory_for() {
        let f = fixture("{}").await;
        let mut row = downloader_row(1, "tr", "tr");
        row.download_dir = r#"[{"type": "movie", "save_path": "/dl/movies", "container_path": "/mnt/movies", "label": "films"}]"#.into();
        f.repo.set_downloaders(vec![Some(row)]);
        f.registry.init_config().await.unwrap();

        let media = MediaInfo::new("x").with_kind(crate::downloader::model::MediaKind::Movie);
        let choice = f.registry.directory_for("1", &media);
        assert_eq!(choice.path.as_deref(), Some("/dl/movies"));
        assert_eq!(choice.category.as_deref(), Some("films"));
        assert_eq!(
            f.registry.visit_dir("1", "/dl/movies"),
            Some(PathBuf::from("/mnt/movies"))
        );
        assert_eq!(f.registry.visit_dir("2", "/dl/movies"), None);
        assert_eq!(f.registry.directory_for("2", &media), DirectoryChoice::default());
    }
}
