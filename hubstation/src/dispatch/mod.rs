//! Download dispatch.

pub mod engine;
pub mod request;

pub use engine::DispatchEngine;
pub use request::{DownloadOutcome, DownloadRequest, SettingSelection};
