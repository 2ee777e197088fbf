//! Download backends: profiles, adapters and the registry that owns them.

pub mod adapter;
pub mod clients;
pub mod factory;
pub mod model;
pub mod registry;
pub mod transfer;

#[cfg(test)]
pub(crate) mod test_support;

pub use adapter::{
    AddTaskOutcome, AddTaskRequest, AdapterFactory, AdapterFamily, BackendAdapter, BackendType,
    TaskAttributes, TaskInfo, TaskQuery,
};
pub use factory::AdapterFactoryTable;
pub use model::{
    DirectoryChoice, DirectoryRule, DownloadRecord, DownloadSettingProfile, DownloaderProfile,
    MediaInfo, MediaKind,
};
pub use registry::DownloaderRegistry;
pub use transfer::{CompletedTask, CompletedTaskSink, LoggingTaskSink};
