//! Backend and download-setting profiles.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{DEFAULT_SETTING_ID, DEFAULT_SETTING_NAME, PT_TAG};

/// Kind of media a request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Tv,
    Anime,
    #[default]
    Unknown,
}

impl MediaKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "movie" => Some(Self::Movie),
            "tv" => Some(Self::Tv),
            "anime" => Some(Self::Anime),
            "unknown" | "" => Some(Self::Unknown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Tv => "tv",
            Self::Anime => "anime",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Descriptor of the item being downloaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Release title as published by the source.
    pub title: String,
    #[serde(default)]
    pub kind: MediaKind,
    /// Category name resolved by the caller, if any.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
    /// Payload link: magnet URI or HTTP(S) URL of a torrent file.
    #[serde(default)]
    pub enclosure: Option<String>,
    /// Detail page the payload was found on.
    #[serde(default)]
    pub page_url: Option<String>,
    /// Name of the source site.
    #[serde(default)]
    pub site: Option<String>,
}

impl MediaInfo {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_kind(mut self, kind: MediaKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_enclosure(mut self, enclosure: impl Into<String>) -> Self {
        self.enclosure = Some(enclosure.into());
        self
    }

    pub fn with_page_url(mut self, page_url: impl Into<String>) -> Self {
        self.page_url = Some(page_url.into());
        self
    }

    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Where a backend saves a given kind of media.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectoryRule {
    /// Media kind the rule applies to; `None` matches every kind.
    #[serde(default, rename = "type", deserialize_with = "de_media_kind")]
    pub media_kind: Option<MediaKind>,
    /// Category the rule applies to; `None` matches every category.
    #[serde(default, deserialize_with = "de_non_empty")]
    pub category: Option<String>,
    /// Path as seen by the backend.
    pub save_path: String,
    /// The same path as seen by this process, when it differs.
    #[serde(default, deserialize_with = "de_non_empty")]
    pub container_path: Option<String>,
    /// Backend category label to apply to tasks saved here.
    #[serde(default, deserialize_with = "de_non_empty")]
    pub label: Option<String>,
}

fn de_non_empty<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

fn de_media_kind<'de, D>(deserializer: D) -> std::result::Result<Option<MediaKind>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .as_deref()
        .and_then(MediaKind::from_str)
        .filter(|kind| *kind != MediaKind::Unknown))
}

/// Directory and category chosen for one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryChoice {
    pub path: Option<String>,
    pub category: Option<String>,
}

/// Connection profile of one backend instance.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloaderProfile {
    pub id: String,
    pub name: String,
    /// Declared type tag, e.g. `transmission` or `qbittorrent`.
    pub backend_type: String,
    pub enabled: bool,
    /// Whether completed tasks should be picked up by the transfer job.
    pub monitor_enabled: bool,
    /// Only pick up tasks carrying the service tag.
    pub tag_isolation: bool,
    /// Only pick up tasks saved under a configured directory.
    pub path_isolation: bool,
    pub transfer_mode: Option<String>,
    /// Backend-specific connection parameters (host, port, credentials).
    pub connection: Value,
    pub directory_rules: Vec<DirectoryRule>,
}

impl DownloaderProfile {
    /// Pick the directory rule for `media`.
    ///
    /// Rules for the media kind are preferred in this order: same category,
    /// no category, any category. Rules without a kind are the fallback.
    pub fn directory_for(&self, media: &MediaInfo) -> DirectoryChoice {
        let kind_matches: Vec<&DirectoryRule> = self
            .directory_rules
            .iter()
            .filter(|rule| rule.media_kind == Some(media.kind))
            .collect();
        let generic: Vec<&DirectoryRule> = self
            .directory_rules
            .iter()
            .filter(|rule| rule.media_kind.is_none())
            .collect();

        let pick = |rules: &[&DirectoryRule]| -> Option<DirectoryRule> {
            let by_category = media.category.as_deref().and_then(|category| {
                rules
                    .iter()
                    .find(|rule| rule.category.as_deref() == Some(category))
            });
            by_category
                .or_else(|| rules.iter().find(|rule| rule.category.is_none()))
                .or_else(|| rules.first())
                .map(|rule| (*rule).clone())
        };

        match pick(&kind_matches).or_else(|| pick(&generic)) {
            Some(rule) => DirectoryChoice {
                path: Some(rule.save_path),
                category: rule.label,
            },
            None => DirectoryChoice::default(),
        }
    }

    /// Translate a backend-side directory into the path visible to this
    /// process, using the rules' container paths.
    pub fn visit_dir(&self, dir: &str) -> Option<PathBuf> {
        if dir.is_empty() {
            return None;
        }
        let dir_path = Path::new(dir);
        for rule in &self.directory_rules {
            let Some(container) = rule.container_path.as_deref() else {
                continue;
            };
            if rule.save_path.is_empty() {
                continue;
            }
            if let Ok(rest) = dir_path.strip_prefix(&rule.save_path) {
                return Some(Path::new(container).join(rest));
            }
        }
        Some(dir_path.to_path_buf())
    }

    /// Whether `path` lies under one of the configured save paths.
    pub fn owns_path(&self, path: &str) -> bool {
        let path = Path::new(path);
        self.directory_rules
            .iter()
            .filter(|rule| !rule.save_path.is_empty())
            .any(|rule| path.starts_with(&rule.save_path))
    }
}

/// A named bundle of submission defaults.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DownloadSettingProfile {
    pub id: String,
    pub name: String,
    pub category: Option<String>,
    /// `;`-separated tag list.
    pub tags: String,
    pub paused: bool,
    /// KiB/s, 0 = unlimited.
    pub upload_limit: u64,
    /// KiB/s, 0 = unlimited.
    pub download_limit: u64,
    pub ratio_limit: f64,
    /// Minutes, 0 = unlimited.
    pub seeding_time_limit: u64,
    /// Empty when the declared backend does not resolve.
    pub backend_id: String,
    pub backend_name: String,
    pub backend_type: String,
}

impl DownloadSettingProfile {
    /// The reserved default setting, optionally bound to a backend.
    pub fn reserved_default(backend: Option<&DownloaderProfile>) -> Self {
        let mut profile = Self {
            id: DEFAULT_SETTING_ID.to_string(),
            name: DEFAULT_SETTING_NAME.to_string(),
            tags: PT_TAG.to_string(),
            ..Self::default()
        };
        profile.bind_backend(backend);
        profile
    }

    /// Point the backend fields at `backend`, or blank them.
    pub fn bind_backend(&mut self, backend: Option<&DownloaderProfile>) {
        match backend {
            Some(backend) => {
                self.backend_id = backend.id.clone();
                self.backend_name = backend.name.clone();
                self.backend_type = backend.backend_type.clone();
            }
            None => {
                self.backend_id.clear();
                self.backend_name.clear();
                self.backend_type.clear();
            }
        }
    }

    /// Tags as a list, empty entries dropped.
    pub fn tag_list(&self) -> Vec<String> {
        split_tags(&self.tags)
    }

    pub fn backend(&self) -> Option<&str> {
        Some(self.backend_id.as_str()).filter(|id| !id.is_empty())
    }
}

/// One accepted submission. Written once, never changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub backend_id: String,
    /// `None` for backends that only report acceptance.
    pub backend_task_id: Option<String>,
    pub save_path: Option<PathBuf>,
    pub media: MediaInfo,
    pub created_at: DateTime<Utc>,
}

pub(crate) fn split_tags(tags: &str) -> Vec<String> {
    tags.split(';')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}
