//! Configuration change monitor.
//!
//! Watches the configuration directory and reloads the configuration when the
//! main file changes. A single task drains the watcher's events, so loads and
//! the reconfiguration fan-out that follows them never overlap.
//!
//! One logical save usually produces several filesystem events. Two guards
//! keep that from turning into several reloads:
//!
//! - a TTL marker per file, set when its first event is handled;
//! - a digest of the file contents compared with the last applied version.

use std::ffi::OsStr;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use notify::{EventKind, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::debounce::ReloadMarkers;
use super::policy::CategoryPolicy;
use super::store::ConfigStore;
use crate::Result;
use crate::constants::CONFIG_EXTENSION;
use crate::registry::ComponentRegistry;

/// Debounce timings.
#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    /// How long the main file stays marked after a reload. Also suppresses
    /// policy events for the same window.
    pub primary_ttl: Duration,
    /// How long the policy file stays marked after a reload.
    pub policy_ttl: Duration,
    /// Delay between the first event and reading the file.
    pub settle: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            primary_ttl: Duration::from_secs(10),
            policy_ttl: Duration::from_secs(3),
            settle: Duration::from_secs(1),
        }
    }
}

/// What handling one change event led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// Not a file the monitor cares about.
    Ignored,
    /// Dropped because a recent event for the same file is still in effect.
    Debounced,
    /// Contents match the last applied version.
    Unchanged,
    /// The configuration was reloaded and every hook was called.
    Reloaded { failed_hooks: Vec<&'static str> },
    /// Only the category policy was reloaded.
    PolicyReloaded,
    /// Reading the configuration failed; the previous snapshot stays current.
    LoadFailed(String),
}

pub struct ConfigChangeMonitor {
    store: Arc<ConfigStore>,
    registry: Arc<ComponentRegistry>,
    policy: Arc<CategoryPolicy>,
    markers: ReloadMarkers,
    config: MonitorConfig,
    applied_digest: Mutex<String>,
    reloads: AtomicU64,
}

impl ConfigChangeMonitor {
    /// Create a monitor. The store's current snapshot counts as applied.
    pub fn new(
        store: Arc<ConfigStore>,
        registry: Arc<ComponentRegistry>,
        policy: Arc<CategoryPolicy>,
        config: MonitorConfig,
    ) -> Self {
        let applied = store.snapshot().digest.clone();
        Self {
            store,
            registry,
            policy,
            markers: ReloadMarkers::new(),
            config,
            applied_digest: Mutex::new(applied),
            reloads: AtomicU64::new(0),
        }
    }

    /// Number of configuration reloads performed by this monitor.
    pub fn reload_count(&self) -> u64 {
        self.reloads.load(Ordering::Relaxed)
    }

    /// Start watching the configuration directory.
    ///
    /// The watcher lives inside the spawned task and is dropped when `token`
    /// is cancelled.
    pub fn start(self: &Arc<Self>, token: CancellationToken) -> Result<JoinHandle<()>> {
        let dir = self.store.config_dir();
        let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();

        let mut watcher = notify::recommended_watcher(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        for path in event.paths {
                            let _ = tx.send(path);
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Configuration watcher error"),
            },
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        info!(dir = %dir.display(), "Watching configuration directory");

        let monitor = self.clone();
        Ok(tokio::spawn(async move {
            let _watcher = watcher;
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Configuration monitor shutting down");
                        break;
                    }
                    path = rx.recv() => {
                        match path {
                            Some(path) => {
                                let outcome = monitor.handle_path(&path).await;
                                debug!(path = %path.display(), ?outcome, "Handled configuration event");
                            }
                            None => break,
                        }
                    }
                }
            }
        }))
    }

    /// Handle one change event for `path`.
    pub async fn handle_path(&self, path: &Path) -> MonitorOutcome {
        if tokio::fs::metadata(path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return MonitorOutcome::Ignored;
        }
        if path.extension().and_then(OsStr::to_str) != Some(CONFIG_EXTENSION) {
            return MonitorOutcome::Ignored;
        }
        let Some(name) = path.file_name().and_then(OsStr::to_str) else {
            return MonitorOutcome::Ignored;
        };

        if Some(name) == self.primary_name().as_deref() {
            return self.reload_primary(name).await;
        }
        if Some(name) == self.policy_name().as_deref() {
            return self.reload_policy(name).await;
        }
        MonitorOutcome::Ignored
    }

    async fn reload_primary(&self, name: &str) -> MonitorOutcome {
        if !self.markers.try_mark(name, self.config.primary_ttl) {
            debug!(file = name, "Configuration reload already in progress");
            return MonitorOutcome::Debounced;
        }

        tokio::time::sleep(self.config.settle).await;

        let on_disk = self.store.digest_on_disk().await;
        if on_disk.as_deref() == Some(self.applied_digest.lock().as_str()) {
            debug!(file = name, "Configuration contents unchanged");
            return MonitorOutcome::Unchanged;
        }

        info!(file = name, "Configuration changed, reloading");
        let snapshot = match self.store.load().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(file = name, error = %e, "Failed to reload configuration");
                return MonitorOutcome::LoadFailed(e.to_string());
            }
        };
        *self.applied_digest.lock() = snapshot.digest.clone();
        self.reloads.fetch_add(1, Ordering::Relaxed);

        let failed_hooks = self.fan_out().await;
        info!(
            generation = snapshot.generation,
            failed = failed_hooks.len(),
            "Configuration reload complete"
        );
        MonitorOutcome::Reloaded { failed_hooks }
    }

    async fn reload_policy(&self, name: &str) -> MonitorOutcome {
        let blocked = self
            .primary_name()
            .is_some_and(|primary| self.markers.is_marked(&primary));
        if blocked || !self.markers.try_mark(name, self.config.policy_ttl) {
            return MonitorOutcome::Debounced;
        }

        tokio::time::sleep(self.config.settle).await;

        info!(file = name, "Category policy changed, reloading");
        if let Err(e) = self.policy.reload().await {
            error!(file = name, error = %e, "Failed to reload category policy");
            return MonitorOutcome::LoadFailed(e.to_string());
        }
        MonitorOutcome::PolicyReloaded
    }

    /// Call `reconfigure()` on every registered component, in registration
    /// order. A failing or panicking hook is logged and does not stop the rest.
    pub async fn fan_out(&self) -> Vec<&'static str> {
        let mut failed = Vec::new();
        for hook in self.registry.reconfigurables() {
            let component = hook.component();
            match AssertUnwindSafe(hook.reconfigure()).catch_unwind().await {
                Ok(Ok(())) => debug!(component, "Component reconfigured"),
                Ok(Err(e)) => {
                    error!(component, error = %e, "Component failed to reconfigure");
                    failed.push(component);
                }
                Err(_) => {
                    error!(component, "Component panicked while reconfiguring");
                    failed.push(component);
                }
            }
        }
        failed
    }

    fn primary_name(&self) -> Option<String> {
        self.store
            .path()
            .file_name()
            .and_then(OsStr::to_str)
            .map(str::to_string)
    }

    fn policy_name(&self) -> Option<String> {
        self.store
            .policy_path()?
            .file_name()
            .and_then(OsStr::to_str)
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Reconfigurable;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct CountingHook {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Reconfigurable for CountingHook {
        fn component(&self) -> &'static str {
            "counting"
        }

        async fn reconfigure(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingHook;

    #[async_trait]
    impl Reconfigurable for FailingHook {
        fn component(&self) -> &'static str {
            "failing"
        }

        async fn reconfigure(&self) -> Result<()> {
            Err(crate::Error::Other("broken".into()))
        }
    }

    fn fast() -> MonitorConfig {
        MonitorConfig {
            primary_ttl: Duration::from_millis(400),
            policy_ttl: Duration::from_millis(200),
            settle: Duration::from_millis(10),
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        config_path: PathBuf,
        policy_path: PathBuf,
        monitor: ConfigChangeMonitor,
        hook: Arc<CountingHook>,
    }

    async fn fixture(with_failing_hook: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        let policy_path = dir.path().join("category.yaml");
        std::fs::write(&config_path, "media:\n  category: category\n").unwrap();
        std::fs::write(&policy_path, "movie: {}\n").unwrap();

        let store = Arc::new(ConfigStore::new(&config_path, None));
        store.load().await.unwrap();
        let registry = Arc::new(ComponentRegistry::new());
        if with_failing_hook {
            registry.register_reconfigurable(|| Arc::new(FailingHook));
        }
        let hook = registry.register_reconfigurable(|| {
            Arc::new(CountingHook {
                calls: AtomicUsize::new(0),
            })
        });
        let policy = Arc::new(CategoryPolicy::new(store.clone()));
        let monitor = ConfigChangeMonitor::new(store, registry, policy, fast());

        Fixture {
            _dir: dir,
            config_path,
            policy_path,
            monitor,
            hook,
        }
    }

    #[tokio::test]
    async fn test_ignores_other_extensions_and_directories() {
        let f = fixture(false).await;
        let dir = f.config_path.parent().unwrap();

        assert_eq!(f.monitor.handle_path(&dir.join("notes.txt")).await, MonitorOutcome::Ignored);
        assert_eq!(f.monitor.handle_path(dir).await, MonitorOutcome::Ignored);
        assert_eq!(f.monitor.handle_path(&dir.join("other.yaml")).await, MonitorOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_unchanged_contents_skip_reload() {
        let f = fixture(false).await;

        let outcome = f.monitor.handle_path(&f.config_path).await;
        assert_eq!(outcome, MonitorOutcome::Unchanged);
        assert_eq!(f.hook.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_second_event_inside_ttl_does_not_reload() {
        let f = fixture(false).await;
        std::fs::write(&f.config_path, "media:\n  category: category\napp: {}\n").unwrap();

        let first = f.monitor.handle_path(&f.config_path).await;
        assert_eq!(first, MonitorOutcome::Reloaded { failed_hooks: vec![] });

        std::fs::write(&f.config_path, "media:\n  category: category\napp: {x: 1}\n").unwrap();
        let second = f.monitor.handle_path(&f.config_path).await;

        assert_eq!(second, MonitorOutcome::Debounced);
        assert_eq!(f.monitor.reload_count(), 1);
        assert_eq!(f.hook.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reload_after_ttl_expires() {
        let f = fixture(false).await;
        std::fs::write(&f.config_path, "media:\n  category: category\napp: {}\n").unwrap();
        f.monitor.handle_path(&f.config_path).await;

        tokio::time::sleep(Duration::from_millis(450)).await;
        std::fs::write(&f.config_path, "media:\n  category: category\napp: {y: 2}\n").unwrap();
        let outcome = f.monitor.handle_path(&f.config_path).await;

        assert!(matches!(outcome, MonitorOutcome::Reloaded { .. }));
        assert_eq!(f.monitor.reload_count(), 2);
    }

    #[tokio::test]
    async fn test_failing_hook_does_not_block_others() {
        let f = fixture(true).await;
        std::fs::write(&f.config_path, "media:\n  category: category\napp: {}\n").unwrap();

        let outcome = f.monitor.handle_path(&f.config_path).await;

        assert_eq!(
            outcome,
            MonitorOutcome::Reloaded {
                failed_hooks: vec!["failing"]
            }
        );
        assert_eq!(f.hook.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_policy_suppressed_while_primary_marked() {
        let f = fixture(false).await;
        std::fs::write(&f.config_path, "media:\n  category: category\napp: {}\n").unwrap();
        f.monitor.handle_path(&f.config_path).await;

        let outcome = f.monitor.handle_path(&f.policy_path).await;
        assert_eq!(outcome, MonitorOutcome::Debounced);
    }

    #[tokio::test]
    async fn test_policy_has_its_own_window() {
        let f = fixture(false).await;

        assert_eq!(
            f.monitor.handle_path(&f.policy_path).await,
            MonitorOutcome::PolicyReloaded
        );
        assert_eq!(
            f.monitor.handle_path(&f.policy_path).await,
            MonitorOutcome::Debounced
        );
        assert_eq!(f.hook.calls.load(Ordering::SeqCst), 0);
    }
}
