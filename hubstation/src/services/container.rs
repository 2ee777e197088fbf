//! Service container for dependency injection.
//!
//! The ServiceContainer owns the component registry, wires every service to
//! its collaborators and manages their lifecycle: initial configuration,
//! the configuration watcher and graceful shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::Result;
use crate::config::{
    Baseline, CategoryPolicy, ConfigChangeMonitor, ConfigStore, EMBEDDED_BASELINE, MonitorConfig,
};
use crate::database::repositories::{
    HistoryStore, ProfileRepository, SqlxHistoryStore, SqlxProfileRepository,
};
use crate::dispatch::{DispatchEngine, DownloadOutcome, DownloadRequest};
use crate::downloader::{AdapterFactoryTable, CompletedTaskSink, DownloaderRegistry, LoggingTaskSink};
use crate::logging::LoggingConfig;
use crate::notification::BroadcastNotifier;
use crate::payload::{HttpPayloadFetcher, PayloadFetcher};
use crate::registry::ComponentRegistry;
use crate::site::SiteDirectory;
use crate::subtitle::{NoopSubtitleFetcher, SubtitleFetcher};

/// Default timeout for backend and payload requests.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the configuration lives and how the watcher behaves.
#[derive(Debug, Clone)]
pub struct ContainerOptions {
    pub config_path: PathBuf,
    pub baseline: Option<Baseline>,
    pub monitor: MonitorConfig,
}

impl ContainerOptions {
    /// Options for `config_path` with the embedded baseline template.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            baseline: Some(Baseline::Embedded(EMBEDDED_BASELINE)),
            monitor: MonitorConfig::default(),
        }
    }
}

/// External collaborators of the services.
pub struct ServiceDependencies {
    pub repository: Arc<dyn ProfileRepository>,
    pub history: Arc<dyn HistoryStore>,
    pub factories: Arc<AdapterFactoryTable>,
    pub fetcher: Arc<dyn PayloadFetcher>,
    pub subtitles: Arc<dyn SubtitleFetcher>,
    pub sink: Arc<dyn CompletedTaskSink>,
    pub logging: Option<Arc<LoggingConfig>>,
}

impl ServiceDependencies {
    /// SQLite-backed repositories and the built-in backends.
    pub fn sqlite(pool: SqlitePool) -> Self {
        Self {
            repository: Arc::new(SqlxProfileRepository::new(pool.clone())),
            history: Arc::new(SqlxHistoryStore::new(pool)),
            factories: Arc::new(AdapterFactoryTable::with_defaults(DEFAULT_REQUEST_TIMEOUT)),
            fetcher: Arc::new(HttpPayloadFetcher::new(DEFAULT_REQUEST_TIMEOUT)),
            subtitles: Arc::new(NoopSubtitleFetcher),
            sink: Arc::new(LoggingTaskSink),
            logging: None,
        }
    }

    pub fn with_logging(mut self, logging: Arc<LoggingConfig>) -> Self {
        self.logging = Some(logging);
        self
    }
}

/// Service container holding all application services.
pub struct ServiceContainer {
    pub registry: Arc<ComponentRegistry>,
    pub config: Arc<ConfigStore>,
    pub downloaders: Arc<DownloaderRegistry>,
    pub sites: Arc<SiteDirectory>,
    pub policy: Arc<CategoryPolicy>,
    pub notifier: Arc<BroadcastNotifier>,
    pub engine: Arc<DispatchEngine>,
    pub monitor: Arc<ConfigChangeMonitor>,
    logging: Option<Arc<LoggingConfig>>,
    monitor_task: Mutex<Option<JoinHandle<()>>>,
    cancellation_token: CancellationToken,
}

impl ServiceContainer {
    /// Load the configuration and build every service.
    ///
    /// Fails only when the configuration file is missing and no baseline is
    /// available. Components that fail their first configuration are logged
    /// and keep their empty state.
    pub async fn new(options: ContainerOptions, deps: ServiceDependencies) -> Result<Self> {
        info!("Initializing service container");
        let cancellation_token = CancellationToken::new();
        let registry = Arc::new(ComponentRegistry::new());

        let config = registry.get_or_create(|| {
            ConfigStore::new(options.config_path.clone(), options.baseline.clone())
        });
        config.load().await?;

        let downloaders = {
            let config = config.clone();
            let token = cancellation_token.clone();
            registry.register_reconfigurable(move || {
                DownloaderRegistry::new(config, deps.repository, deps.factories, deps.sink, token)
            })
        };
        let sites = {
            let config = config.clone();
            registry.register_reconfigurable(move || Arc::new(SiteDirectory::new(config)))
        };
        let policy = {
            let config = config.clone();
            registry.register_reconfigurable(move || Arc::new(CategoryPolicy::new(config)))
        };
        if let Some(logging) = &deps.logging {
            logging.attach(config.clone());
            registry.register_reconfigurable(|| logging.clone());
        }

        let notifier = registry.get_or_create(BroadcastNotifier::new);
        let engine = {
            let (config, downloaders, sites, notifier) =
                (config.clone(), downloaders.clone(), sites.clone(), notifier.clone());
            registry.get_or_create(move || {
                DispatchEngine::new(
                    config,
                    downloaders,
                    sites,
                    deps.fetcher,
                    deps.history,
                    notifier,
                    deps.subtitles,
                )
            })
        };

        let monitor = Arc::new(ConfigChangeMonitor::new(
            config.clone(),
            registry.clone(),
            policy.clone(),
            options.monitor,
        ));
        let failed = monitor.fan_out().await;
        if !failed.is_empty() {
            warn!(components = ?failed, "Some components failed their initial configuration");
        }

        info!(components = registry.len(), "Service container initialized");
        Ok(Self {
            registry,
            config,
            downloaders,
            sites,
            policy,
            notifier,
            engine,
            monitor,
            logging: deps.logging,
            monitor_task: Mutex::new(None),
            cancellation_token,
        })
    }

    /// Container over a SQLite pool with the built-in backends.
    pub async fn with_pool(
        pool: SqlitePool,
        options: ContainerOptions,
        logging: Option<Arc<LoggingConfig>>,
    ) -> Result<Self> {
        let mut deps = ServiceDependencies::sqlite(pool);
        deps.logging = logging;
        Self::new(options, deps).await
    }

    /// Start background work: the configuration watcher and log retention.
    pub fn start(&self) -> Result<()> {
        let handle = self.monitor.start(self.cancellation_token.child_token())?;
        if let Some(previous) = self.monitor_task.lock().replace(handle) {
            previous.abort();
        }
        if let Some(logging) = &self.logging {
            logging.start_retention_cleanup(self.cancellation_token.child_token());
        }
        Ok(())
    }

    /// Submit a download request.
    pub async fn download(&self, request: DownloadRequest) -> DownloadOutcome {
        self.engine.download(request).await
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Stop the watcher and the transfer service.
    pub async fn shutdown(&self) {
        info!("Shutting down services");
        self.cancellation_token.cancel();
        let task = self.monitor_task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!(error = %e, "Configuration monitor ended abnormally");
        }
        self.downloaders.stop_service().await;
        info!("Services stopped");
    }
}
