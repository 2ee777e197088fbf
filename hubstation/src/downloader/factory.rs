//! Adapter factory table.
//!
//! Built once at startup. Selecting an adapter walks the factories in
//! registration order and uses the first one that accepts the profile's type
//! tag and builds successfully.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use super::adapter::{AdapterFactory, BackendAdapter};
use super::clients::{Aria2Factory, QBittorrentFactory, TransmissionFactory};
use super::model::DownloaderProfile;

pub struct AdapterFactoryTable {
    factories: Vec<Arc<dyn AdapterFactory>>,
}

impl AdapterFactoryTable {
    pub fn new(factories: Vec<Arc<dyn AdapterFactory>>) -> Self {
        Self { factories }
    }

    /// Transmission, qBittorrent and aria2, in that order.
    pub fn with_defaults(request_timeout: Duration) -> Self {
        Self::new(vec![
            Arc::new(TransmissionFactory::new(request_timeout)),
            Arc::new(QBittorrentFactory::new(request_timeout)),
            Arc::new(Aria2Factory::new(request_timeout)),
        ])
    }

    /// Build an adapter for `profile`, or `None` when no factory can.
    pub fn select(&self, profile: &DownloaderProfile) -> Option<Arc<dyn BackendAdapter>> {
        for factory in &self.factories {
            if !factory.matches(&profile.backend_type) {
                continue;
            }
            match std::panic::catch_unwind(AssertUnwindSafe(|| factory.build(profile))) {
                Ok(Ok(adapter)) => {
                    debug!(
                        downloader = %profile.name,
                        backend_type = %factory.backend_type(),
                        "Built backend adapter"
                    );
                    return Some(adapter);
                }
                Ok(Err(e)) => {
                    warn!(
                        downloader = %profile.name,
                        backend_type = %factory.backend_type(),
                        error = %e,
                        "Adapter construction failed, trying the next factory"
                    );
                }
                Err(_) => {
                    error!(
                        downloader = %profile.name,
                        backend_type = %factory.backend_type(),
                        "Adapter construction panicked, trying the next factory"
                    );
                }
            }
        }
        warn!(
            downloader = %profile.name,
            type_tag = %profile.backend_type,
            "No adapter available for backend type"
        );
        None
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::adapter::{
        AdapterFamily, AddTaskOutcome, AddTaskRequest, BackendType, TaskInfo, TaskQuery,
    };
    use crate::{Error, Result};
    use async_trait::async_trait;
    use serde_json::json;

    struct Named(&'static str);

    #[async_trait]
    impl BackendAdapter for Named {
        fn backend_type(&self) -> BackendType {
            BackendType::QBittorrent
        }

        fn family(&self) -> AdapterFamily {
            AdapterFamily::Direct
        }

        async fn connect(&self) -> Result<()> {
            Ok(())
        }

        async fn add_task(&self, _request: &AddTaskRequest) -> Result<AddTaskOutcome> {
            Ok(AddTaskOutcome::TaskId(self.0.to_string()))
        }

        async fn query_tasks(&self, _query: &TaskQuery) -> Result<Vec<TaskInfo>> {
            Ok(Vec::new())
        }
    }

    enum Behaviour {
        Fail,
        Panic,
        Build(&'static str),
    }

    struct TestFactory(Behaviour);

    impl AdapterFactory for TestFactory {
        fn backend_type(&self) -> BackendType {
            BackendType::QBittorrent
        }

        fn build(&self, _profile: &DownloaderProfile) -> Result<Arc<dyn BackendAdapter>> {
            match self.0 {
                Behaviour::Fail => Err(Error::adapter_construction("qbittorrent", "bad host")),
                Behaviour::Panic => panic!("factory bug"),
                Behaviour::Build(name) => Ok(Arc::new(Named(name))),
            }
        }
    }

    fn profile(type_tag: &str) -> DownloaderProfile {
        DownloaderProfile {
            id: "1".into(),
            name: "box".into(),
            backend_type: type_tag.into(),
            enabled: true,
            monitor_enabled: false,
            tag_isolation: false,
            path_isolation: false,
            transfer_mode: None,
            connection: json!({}),
            directory_rules: Vec::new(),
        }
    }

    async fn selected_name(table: &AdapterFactoryTable, type_tag: &str) -> Option<String> {
        let adapter = table.select(&profile(type_tag))?;
        let outcome = adapter
            .add_task(&AddTaskRequest {
                content: crate::payload::PayloadContent::Magnet("magnet:?".into()),
                paused: false,
                save_dir: None,
                tags: Vec::new(),
                category: None,
                upload_limit: 0,
                download_limit: 0,
                ratio_limit: 0.0,
                seeding_time_limit: 0,
                cookie: None,
            })
            .await
            .unwrap();
        outcome.task_id().map(str::to_string)
    }

    #[tokio::test]
    async fn test_broken_factories_are_skipped() {
        let table = AdapterFactoryTable::new(vec![
            Arc::new(TestFactory(Behaviour::Fail)),
            Arc::new(TestFactory(Behaviour::Panic)),
            Arc::new(TestFactory(Behaviour::Build("second"))),
            Arc::new(TestFactory(Behaviour::Build("third"))),
        ]);

        assert_eq!(selected_name(&table, "qb").await.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_no_match_is_none() {
        let table = AdapterFactoryTable::new(vec![Arc::new(TestFactory(Behaviour::Build("x")))]);
        assert!(table.select(&profile("transmission")).is_none());
        assert!(table.select(&profile("")).is_none());
    }

    #[test]
    fn test_default_table_matches_each_type() {
        let table = AdapterFactoryTable::with_defaults(Duration::from_secs(5));
        assert_eq!(table.len(), 3);

        let mut tr = profile("tr");
        tr.connection = json!({"host": "127.0.0.1", "port": 9091});
        assert_eq!(
            table.select(&tr).map(|a| a.backend_type()),
            Some(BackendType::Transmission)
        );

        let mut aria = profile("aria2");
        aria.connection = json!({"host": "http://127.0.0.1", "port": 6800, "secret": "s"});
        assert_eq!(
            table.select(&aria).map(|a| a.backend_type()),
            Some(BackendType::Aria2)
        );
    }
}
