//! Configuration document store.
//!
//! Holds the current configuration document as an immutable snapshot. A
//! reload replaces the whole snapshot at once, so readers observe either the
//! previous or the new document and never a partially applied one.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::constants::{CONFIG_EXTENSION, DEFAULT_UA};
use crate::{Error, Result};

/// Built-in configuration template shipped with the binary.
pub const EMBEDDED_BASELINE: &str = include_str!("../../config/config.yaml");

/// Where to take a configuration template from when the file is missing.
#[derive(Debug, Clone)]
pub enum Baseline {
    /// Copy a template file from disk.
    File(PathBuf),
    /// Write a template compiled into the binary.
    Embedded(&'static str),
}

/// One loaded version of the configuration document.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    /// The parsed document; always a JSON object.
    pub document: Value,
    /// SHA-256 of the raw file bytes, hex encoded. Empty before the first load.
    pub digest: String,
    /// Incremented on every load or save.
    pub generation: u64,
    pub loaded_at: DateTime<Utc>,
}

impl ConfigSnapshot {
    fn empty() -> Self {
        Self {
            document: Value::Object(Map::new()),
            digest: String::new(),
            generation: 0,
            loaded_at: Utc::now(),
        }
    }
}

/// Store for the YAML configuration document.
pub struct ConfigStore {
    path: PathBuf,
    baseline: Option<Baseline>,
    current: RwLock<Arc<ConfigSnapshot>>,
}

impl ConfigStore {
    /// Create a store for `path`. Nothing is read until [`load`](Self::load).
    pub fn new(path: impl Into<PathBuf>, baseline: Option<Baseline>) -> Self {
        Self {
            path: path.into(),
            baseline,
            current: RwLock::new(Arc::new(ConfigSnapshot::empty())),
        }
    }

    /// Path of the configuration file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory containing the configuration file.
    pub fn config_dir(&self) -> PathBuf {
        self.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Read the document from disk and install it as the current snapshot.
    ///
    /// A missing file is first created from the baseline template; without a
    /// baseline this fails with [`Error::ConfigMissing`]. A document that does
    /// not parse is replaced by an empty one and only logged.
    ///
    /// Callers must serialize concurrent `load()` invocations.
    pub async fn load(&self) -> Result<Arc<ConfigSnapshot>> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            self.install_baseline().await?;
        }

        info!(path = %self.path.display(), "Loading configuration");
        let raw = tokio::fs::read(&self.path)
            .await
            .map_err(|e| Error::io_path("reading configuration", &self.path, e))?;

        let document = match parse_document(&raw) {
            Ok(document) => document,
            Err(reason) => {
                let err = Error::ConfigParse {
                    path: self.path.clone(),
                    reason,
                };
                warn!(error = %err, "Configuration is malformed, continuing with an empty document");
                Value::Object(Map::new())
            }
        };

        Ok(self.install(document, digest_of(&raw)))
    }

    /// Overwrite the file with `document` and make it current.
    ///
    /// The file is replaced atomically; the in-memory snapshot only changes
    /// once the durable write succeeded.
    pub async fn save(&self, document: Value) -> Result<Arc<ConfigSnapshot>> {
        let document = match document {
            Value::Object(_) => document,
            Value::Null => Value::Object(Map::new()),
            other => {
                return Err(Error::Other(format!(
                    "configuration document must be a mapping, got {}",
                    value_kind(&other)
                )));
            }
        };

        let text = serde_yml::to_string(&document)?;
        let path = self.path.clone();
        let dir = self.config_dir();
        let bytes = text.into_bytes();
        let written = bytes.clone();

        tokio::task::spawn_blocking(move || write_atomic(&dir, &path, &written))
            .await
            .map_err(|e| Error::UnexpectedInternal(format!("configuration writer panicked: {e}")))??;

        debug!(path = %self.path.display(), "Configuration saved");
        Ok(self.install(document, digest_of(&bytes)))
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.current.read().clone()
    }

    /// The whole current document.
    pub fn document(&self) -> Value {
        self.snapshot().document.clone()
    }

    /// A top-level section; empty when the section is unknown or not a mapping.
    pub fn get(&self, section: &str) -> Map<String, Value> {
        self.snapshot()
            .document
            .get(section)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }

    /// Deserialize a section, falling back to `T::default()` when it is
    /// absent or does not match the expected shape.
    pub fn section<T>(&self, name: &str) -> T
    where
        T: DeserializeOwned + Default,
    {
        let snapshot = self.snapshot();
        let Some(value) = snapshot.document.get(name) else {
            return T::default();
        };
        match serde_json::from_value(value.clone()) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(section = name, error = %e, "Configuration section has an unexpected shape");
                T::default()
            }
        }
    }

    /// Digest of the file as it is on disk right now.
    pub async fn digest_on_disk(&self) -> Option<String> {
        tokio::fs::read(&self.path).await.ok().map(|raw| digest_of(&raw))
    }

    /// Path of the secondary policy document named by `media.category`.
    pub fn policy_path(&self) -> Option<PathBuf> {
        let media = self.get("media");
        let category = media.get("category").and_then(Value::as_str)?.trim();
        if category.is_empty() {
            return None;
        }
        Some(
            self.config_dir()
                .join(format!("{category}.{CONFIG_EXTENSION}")),
        )
    }

    /// User-Agent for outgoing requests.
    pub fn user_agent(&self) -> String {
        self.get("app")
            .get("user_agent")
            .and_then(Value::as_str)
            .filter(|ua| !ua.is_empty())
            .unwrap_or(DEFAULT_UA)
            .to_string()
    }

    /// Proxy URL configured under `app.proxies`.
    ///
    /// Accepts either a plain string or a `{http, https}` mapping, preferring
    /// the https entry.
    pub fn proxy(&self) -> Option<String> {
        let app = self.get("app");
        match app.get("proxies")? {
            Value::String(url) if !url.is_empty() => Some(url.clone()),
            Value::Object(map) => map
                .get("https")
                .or_else(|| map.get("http"))
                .and_then(Value::as_str)
                .filter(|url| !url.is_empty())
                .map(str::to_string),
            _ => None,
        }
    }

    fn install(&self, document: Value, digest: String) -> Arc<ConfigSnapshot> {
        let mut current = self.current.write();
        let snapshot = Arc::new(ConfigSnapshot {
            document,
            digest,
            generation: current.generation + 1,
            loaded_at: Utc::now(),
        });
        *current = snapshot.clone();
        snapshot
    }

    async fn install_baseline(&self) -> Result<()> {
        let Some(baseline) = &self.baseline else {
            return Err(Error::ConfigMissing {
                path: self.path.clone(),
            });
        };

        let dir = self.config_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::io_path("creating configuration directory", &dir, e))?;

        match baseline {
            Baseline::File(template) => {
                if !tokio::fs::try_exists(template).await.unwrap_or(false) {
                    return Err(Error::ConfigMissing {
                        path: self.path.clone(),
                    });
                }
                tokio::fs::copy(template, &self.path)
                    .await
                    .map_err(|e| Error::io_path("copying configuration template", template, e))?;
            }
            Baseline::Embedded(text) => {
                tokio::fs::write(&self.path, text)
                    .await
                    .map_err(|e| Error::io_path("writing configuration template", &self.path, e))?;
            }
        }

        info!(path = %self.path.display(), "Configuration file missing, installed the baseline template");
        Ok(())
    }
}

fn parse_document(raw: &[u8]) -> std::result::Result<Value, String> {
    let text = std::str::from_utf8(raw).map_err(|e| e.to_string())?;
    if text.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    match serde_yml::from_str::<Value>(text).map_err(|e| e.to_string())? {
        Value::Null => Ok(Value::Object(Map::new())),
        document @ Value::Object(_) => Ok(document),
        other => Err(format!("top level must be a mapping, got {}", value_kind(&other))),
    }
}

fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    use std::io::Write;

    std::fs::create_dir_all(dir)
        .map_err(|e| Error::io_path("creating configuration directory", dir, e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| Error::io_path("creating temporary configuration", dir, e))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| Error::io_path("writing temporary configuration", tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| Error::io_path("replacing configuration", path, e.error))?;
    Ok(())
}

pub(crate) fn digest_of(raw: &[u8]) -> String {
    hex::encode(Sha256::digest(raw))
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}
