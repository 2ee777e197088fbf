//! Download request and outcome types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::BYPASS_SETTING_ID;
use crate::downloader::model::MediaInfo;

/// Which download setting a request uses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "id", rename_all = "snake_case")]
pub enum SettingSelection {
    /// Use the site's default setting, else the reserved default.
    #[default]
    Unspecified,
    /// Use this setting, or the reserved default when it does not exist.
    Profile(String),
    /// Use no setting; only values given on the request apply.
    Bypass,
}

impl SettingSelection {
    /// Interpret a raw setting id. `"-2"` bypasses settings; empty means
    /// unspecified.
    pub fn from_id(id: Option<&str>) -> Self {
        match id.map(str::trim) {
            None | Some("") => Self::Unspecified,
            Some(BYPASS_SETTING_ID) => Self::Bypass,
            Some(id) => Self::Profile(id.to_string()),
        }
    }
}

/// A fully specified submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub media: MediaInfo,
    /// Backend to use instead of the one the setting names.
    pub downloader_id: Option<String>,
    pub setting: SettingSelection,
    pub paused: Option<bool>,
    /// Added to the setting's tags.
    pub tags: Vec<String>,
    /// Save directory instead of the backend's directory rules.
    pub save_dir: Option<String>,
    /// KiB/s.
    pub upload_limit: Option<u64>,
    /// KiB/s.
    pub download_limit: Option<u64>,
    /// Overrides the site's proxy flag.
    pub proxy: Option<bool>,
    /// Local `.torrent` file to submit instead of the media's enclosure.
    pub payload_path: Option<PathBuf>,
    /// Where the request came from, passed to notifications.
    pub origin: Option<String>,
    pub user_name: Option<String>,
}

impl DownloadRequest {
    pub fn new(media: MediaInfo) -> Self {
        Self {
            media,
            ..Self::default()
        }
    }

    pub fn with_downloader(mut self, downloader_id: impl Into<String>) -> Self {
        self.downloader_id = Some(downloader_id.into());
        self
    }

    pub fn with_setting(mut self, setting: SettingSelection) -> Self {
        self.setting = setting;
        self
    }

    pub fn with_paused(mut self, paused: bool) -> Self {
        self.paused = Some(paused);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_save_dir(mut self, save_dir: impl Into<String>) -> Self {
        self.save_dir = Some(save_dir.into());
        self
    }

    pub fn with_limits(mut self, upload: Option<u64>, download: Option<u64>) -> Self {
        self.upload_limit = upload;
        self.download_limit = download;
        self
    }

    pub fn with_proxy(mut self, proxy: bool) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_payload_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.payload_path = Some(path.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>, user_name: Option<String>) -> Self {
        self.origin = Some(origin.into());
        self.user_name = user_name;
        self
    }
}

/// Result of [`DispatchEngine::download`](super::DispatchEngine::download).
///
/// On success `message` is empty. `task_id` may still be `None` for backends
/// that only report acceptance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadOutcome {
    pub downloader_id: Option<String>,
    pub task_id: Option<String>,
    pub message: String,
}

impl DownloadOutcome {
    pub fn success(downloader_id: String, task_id: Option<String>) -> Self {
        Self {
            downloader_id: Some(downloader_id),
            task_id,
            message: String::new(),
        }
    }

    pub fn failure(downloader_id: Option<String>, message: impl Into<String>) -> Self {
        Self {
            downloader_id,
            task_id: None,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.message.is_empty()
    }
}
