//! Hand-off of completed backend tasks.
//!
//! The recurring transfer job lists completed tasks of a monitored backend and
//! passes each new one to a [`CompletedTaskSink`]. Organizing the files is the
//! sink's business.

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use dashmap::DashSet;
use tracing::info;

use super::adapter::TaskInfo;
use crate::Result;

/// A finished task, with its location translated to a local path.
#[derive(Debug, Clone)]
pub struct CompletedTask {
    pub downloader_id: String,
    pub downloader_name: String,
    pub transfer_mode: Option<String>,
    pub task: TaskInfo,
    /// `<visit dir>/<task name>`, when the save path could be translated.
    pub local_path: Option<PathBuf>,
}

#[async_trait]
pub trait CompletedTaskSink: Send + Sync {
    async fn handle(&self, task: CompletedTask) -> Result<()>;
}

/// Sink that only logs.
#[derive(Debug, Default)]
pub struct LoggingTaskSink;

#[async_trait]
impl CompletedTaskSink for LoggingTaskSink {
    async fn handle(&self, task: CompletedTask) -> Result<()> {
        info!(
            downloader = %task.downloader_name,
            task_id = %task.task.id,
            name = %task.task.name,
            path = ?task.local_path,
            mode = task.transfer_mode.as_deref().unwrap_or("default"),
            "Download completed"
        );
        Ok(())
    }
}

/// Task ids already handed off, per backend.
#[derive(Debug, Default)]
pub(crate) struct HandedOff {
    seen: DashSet<(String, String)>,
}

impl HandedOff {
    /// Record a task; `false` when it was already recorded.
    pub fn insert(&self, downloader_id: &str, task_id: &str) -> bool {
        self.seen
            .insert((downloader_id.to_string(), task_id.to_string()))
    }

    pub fn remove(&self, downloader_id: &str, task_id: &str) {
        self.seen
            .remove(&(downloader_id.to_string(), task_id.to_string()));
    }

    /// Forget the backend's tasks that are no longer in `listed`.
    pub fn prune(&self, downloader_id: &str, listed: &HashSet<&str>) {
        self.seen
            .retain(|(id, task_id)| id != downloader_id || listed.contains(task_id.as_str()));
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handed_off_once() {
        let seen = HandedOff::default();
        assert!(seen.insert("1", "abc"));
        assert!(!seen.insert("1", "abc"));
        assert!(seen.insert("2", "abc"));
        seen.remove("1", "abc");
        assert!(seen.insert("1", "abc"));
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_prune_keeps_listed_and_other_backends() {
        let seen = HandedOff::default();
        seen.insert("1", "kept");
        seen.insert("1", "gone");
        seen.insert("2", "gone");

        seen.prune("1", &HashSet::from(["kept"]));

        assert_eq!(seen.len(), 2);
        assert!(!seen.insert("1", "kept"));
        assert!(seen.insert("1", "gone"));
        assert!(!seen.insert("2", "gone"));
    }
}
