//! End-to-end tests wiring the service container over an in-memory database
//! and a configuration file on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use hubstation::config::{MonitorConfig, MonitorOutcome};
use hubstation::database::repositories::{MemoryHistoryStore, SqlxProfileRepository};
use hubstation::database::{DbPool, init_pool, run_migrations};
use hubstation::dispatch::{DownloadRequest, SettingSelection};
use hubstation::downloader::adapter::{
    AddTaskOutcome, AddTaskRequest, AdapterFactory, AdapterFamily, BackendAdapter, BackendType,
    TaskInfo, TaskQuery,
};
use hubstation::downloader::model::{DownloaderProfile, MediaInfo};
use hubstation::downloader::{AdapterFactoryTable, LoggingTaskSink};
use hubstation::notification::NotificationEvent;
use hubstation::payload::{Acquired, FetchOptions, PayloadFetcher};
use hubstation::services::{ContainerOptions, ServiceContainer, ServiceDependencies};
use hubstation::subtitle::NoopSubtitleFetcher;

/// Adapter that accepts everything and remembers which profile built it.
struct RecordingAdapter {
    profile_id: String,
    submissions: Arc<Mutex<Vec<(String, AddTaskRequest)>>>,
}

#[async_trait]
impl BackendAdapter for RecordingAdapter {
    fn backend_type(&self) -> BackendType {
        BackendType::Transmission
    }

    fn family(&self) -> AdapterFamily {
        AdapterFamily::Direct
    }

    async fn connect(&self) -> hubstation::Result<()> {
        Ok(())
    }

    async fn add_task(&self, request: &AddTaskRequest) -> hubstation::Result<AddTaskOutcome> {
        let mut submissions = self.submissions.lock();
        submissions.push((self.profile_id.clone(), request.clone()));
        Ok(AddTaskOutcome::TaskId(format!(
            "{}-{}",
            self.profile_id,
            submissions.len()
        )))
    }

    async fn query_tasks(&self, _query: &TaskQuery) -> hubstation::Result<Vec<TaskInfo>> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
struct RecordingFactory {
    submissions: Arc<Mutex<Vec<(String, AddTaskRequest)>>>,
}

impl AdapterFactory for RecordingFactory {
    fn backend_type(&self) -> BackendType {
        BackendType::Transmission
    }

    fn build(&self, profile: &DownloaderProfile) -> hubstation::Result<Arc<dyn BackendAdapter>> {
        Ok(Arc::new(RecordingAdapter {
            profile_id: profile.id.clone(),
            submissions: self.submissions.clone(),
        }))
    }
}

struct OfflineFetcher;

#[async_trait]
impl PayloadFetcher for OfflineFetcher {
    async fn acquire(&self, url: &str, _options: &FetchOptions) -> Acquired {
        Acquired::failed(format!("offline: {url}"))
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    config_path: PathBuf,
    container: ServiceContainer,
    history: Arc<MemoryHistoryStore>,
    submissions: Arc<Mutex<Vec<(String, AddTaskRequest)>>>,
}

async fn setup_test_db() -> DbPool {
    let pool = init_pool("sqlite::memory:")
        .await
        .expect("Failed to create test pool");
    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    sqlx::query(
        r#"
        INSERT INTO downloader (id, name, type, enabled, config) VALUES
            (1, 'living-room', 'transmission', 1, '{"host":"10.0.0.1","port":9091}'),
            (2, 'attic', 'transmission', 1, '{"host":"10.0.0.2","port":9091}')
        "#,
    )
    .execute(&pool)
    .await
    .expect("Failed to insert downloaders");
    sqlx::query(
        "INSERT INTO download_setting (id, name, category, tags, downloader) VALUES (10, 'movies', 'film', 'hd', '2')",
    )
    .execute(&pool)
    .await
    .expect("Failed to insert setting");
    pool
}

fn config_with_default(backend: &str) -> String {
    format!(
        "app:\n  log_filter: ''\npt:\n  default_downloader: '{backend}'\n  download_order: ['{backend}']\nsites: []\n"
    )
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.yaml");
    std::fs::write(&config_path, config_with_default("1")).unwrap();

    let pool = setup_test_db().await;
    let factory = RecordingFactory::default();
    let submissions = factory.submissions.clone();
    let history = Arc::new(MemoryHistoryStore::new());
    let deps = ServiceDependencies {
        repository: Arc::new(SqlxProfileRepository::new(pool)),
        history: history.clone(),
        factories: Arc::new(AdapterFactoryTable::new(vec![
            Arc::new(factory) as Arc<dyn AdapterFactory>
        ])),
        fetcher: Arc::new(OfflineFetcher),
        subtitles: Arc::new(NoopSubtitleFetcher),
        sink: Arc::new(LoggingTaskSink),
        logging: None,
    };
    let mut options = ContainerOptions::new(&config_path);
    options.monitor = MonitorConfig {
        primary_ttl: Duration::from_millis(50),
        policy_ttl: Duration::from_millis(50),
        settle: Duration::ZERO,
    };

    let container = ServiceContainer::new(options, deps)
        .await
        .expect("Failed to build container");
    Fixture {
        _dir: dir,
        config_path,
        container,
        history,
        submissions,
    }
}

fn magnet(title: &str) -> MediaInfo {
    MediaInfo::new(title).with_enclosure("magnet:?xt=urn:btih:0123456789abcdef")
}

fn backend_of_last(submissions: &Mutex<Vec<(String, AddTaskRequest)>>) -> Option<String> {
    submissions.lock().last().map(|(id, _)| id.clone())
}

async fn rewrite(path: &Path, contents: &str) {
    tokio::fs::write(path, contents).await.unwrap();
}

#[tokio::test]
async fn test_container_loads_profiles_from_database() {
    let f = fixture().await;
    let downloaders = &f.container.downloaders;

    assert_eq!(downloaders.downloaders().len(), 2);
    assert_eq!(downloaders.download_order(), vec!["1".to_string()]);
    assert_eq!(downloaders.default_setting().backend_id, "1");
    assert_eq!(
        downloaders.download_setting("10").map(|s| s.backend_id),
        Some("2".to_string())
    );
    assert!(f.container.registry.len() >= 5);
}

#[tokio::test]
async fn test_download_records_history_and_notifies() {
    let f = fixture().await;
    let mut events = f.container.notifier.subscribe();

    let outcome = f
        .container
        .download(DownloadRequest::new(magnet("Night Train")).with_origin("api", None))
        .await;

    assert!(outcome.is_success(), "unexpected failure: {}", outcome.message);
    assert_eq!(outcome.downloader_id.as_deref(), Some("1"));
    assert_eq!(outcome.task_id.as_deref(), Some("1-1"));
    assert_eq!(f.history.len(), 1);
    assert_eq!(f.history.records()[0].backend_task_id.as_deref(), Some("1-1"));

    match events.try_recv().expect("no notification sent") {
        NotificationEvent::DownloadSucceeded {
            backend_id, origin, ..
        } => {
            assert_eq!(backend_id, "1");
            assert_eq!(origin.as_deref(), Some("api"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_setting_backend_and_tags_apply() {
    let f = fixture().await;

    let outcome = f
        .container
        .download(
            DownloadRequest::new(magnet("Harbour Lights"))
                .with_setting(SettingSelection::Profile("10".into()))
                .with_tag("manual"),
        )
        .await;

    assert!(outcome.is_success(), "unexpected failure: {}", outcome.message);
    assert_eq!(outcome.downloader_id.as_deref(), Some("2"));
    let submissions = f.submissions.lock();
    let (_, request) = submissions.last().unwrap();
    assert_eq!(request.category.as_deref(), Some("film"));
    assert!(request.tags.iter().any(|t| t == "hd"));
    assert!(request.tags.iter().any(|t| t == "manual"));
}

#[tokio::test]
async fn test_failed_acquisition_reports_and_skips_history() {
    let f = fixture().await;

    let outcome = f
        .container
        .download(DownloadRequest::new(
            MediaInfo::new("Remote").with_enclosure("https://tracker.example.org/dl/1"),
        ))
        .await;

    assert!(!outcome.is_success());
    assert!(outcome.message.contains("offline"));
    assert!(f.history.is_empty());
    assert!(f.submissions.lock().is_empty());
}

#[tokio::test]
async fn test_config_change_reconfigures_default_backend() {
    let f = fixture().await;

    f.container.download(DownloadRequest::new(magnet("Before"))).await;
    assert_eq!(backend_of_last(&f.submissions).as_deref(), Some("1"));

    rewrite(&f.config_path, &config_with_default("2")).await;
    let outcome = f.container.monitor.handle_path(&f.config_path).await;
    assert_eq!(outcome, MonitorOutcome::Reloaded { failed_hooks: vec![] });
    assert_eq!(f.container.monitor.reload_count(), 1);

    f.container.download(DownloadRequest::new(magnet("After"))).await;
    assert_eq!(backend_of_last(&f.submissions).as_deref(), Some("2"));
    assert_eq!(f.container.downloaders.download_order(), vec!["2".to_string()]);
}

#[tokio::test]
async fn test_unchanged_config_is_not_reapplied() {
    let f = fixture().await;

    let outcome = f.container.monitor.handle_path(&f.config_path).await;

    assert_eq!(outcome, MonitorOutcome::Unchanged);
    assert_eq!(f.container.monitor.reload_count(), 0);
}

#[tokio::test]
async fn test_start_and_shutdown() {
    let f = fixture().await;

    f.container.start().expect("Failed to start container");
    f.container.shutdown().await;

    assert!(f.container.cancellation_token().is_cancelled());
    assert!(!f.container.downloaders.scheduler().is_running().await);
}
