//! Category policy document.
//!
//! A secondary YAML file next to the main configuration, named by
//! `media.category`. Its top-level keys are media kinds (`movie`, `tv`,
//! `anime`) mapping category names to matching rules.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::store::ConfigStore;
use crate::Result;
use crate::registry::Reconfigurable;

pub struct CategoryPolicy {
    config: Arc<ConfigStore>,
    document: RwLock<Arc<Value>>,
}

impl CategoryPolicy {
    pub fn new(config: Arc<ConfigStore>) -> Self {
        Self {
            config,
            document: RwLock::new(Arc::new(Value::Object(Map::new()))),
        }
    }

    /// Path of the policy file for the current configuration.
    pub fn path(&self) -> Option<PathBuf> {
        self.config.policy_path()
    }

    /// Re-read the policy file. A missing or malformed file leaves an empty
    /// policy in place.
    pub async fn reload(&self) -> Result<()> {
        let document = match self.path() {
            None => {
                debug!("No category policy configured");
                Value::Object(Map::new())
            }
            Some(path) => match tokio::fs::read_to_string(&path).await {
                Ok(text) => match serde_yml::from_str::<Value>(&text) {
                    Ok(value @ Value::Object(_)) => value,
                    Ok(_) => Value::Object(Map::new()),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Category policy is malformed");
                        Value::Object(Map::new())
                    }
                },
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    info!(path = %path.display(), "Category policy file not found");
                    Value::Object(Map::new())
                }
                Err(e) => return Err(crate::Error::io_path("reading category policy", path, e)),
            },
        };

        *self.document.write() = Arc::new(document);
        Ok(())
    }

    /// Rules for one media kind.
    pub fn rules(&self, kind: &str) -> Map<String, Value> {
        self.document
            .read()
            .get(kind)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }

    /// Category names declared for one media kind, sorted by name.
    pub fn categories(&self, kind: &str) -> Vec<String> {
        self.rules(kind).keys().cloned().collect()
    }
}

#[async_trait]
impl Reconfigurable for CategoryPolicy {
    fn component(&self) -> &'static str {
        "category_policy"
    }

    async fn reconfigure(&self) -> Result<()> {
        self.reload().await
    }
}
