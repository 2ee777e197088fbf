//! Site metadata lookup.
//!
//! Sites are declared under the `sites` section of the configuration. Each
//! entry carries what is needed to fetch a payload from that site (cookie,
//! User-Agent, referer and proxy flags) plus its default download setting.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::Result;
use crate::config::ConfigStore;
use crate::registry::Reconfigurable;

/// Per-site metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteInfo {
    pub id: String,
    pub name: String,
    pub url: String,
    pub cookie: Option<String>,
    pub user_agent: Option<String>,
    /// Send the detail page as referer when fetching payloads.
    pub referer: bool,
    /// Fetch payloads through the configured proxy.
    pub proxy: bool,
    /// The site publishes subtitle files on its detail pages.
    pub subtitle: bool,
    /// Download setting id used when a request names none.
    pub download_setting: Option<String>,
}

impl SiteInfo {
    fn host(&self) -> Option<String> {
        host_of(&self.url)
    }
}

/// Lookup of site metadata for payload acquisition.
pub trait SiteProvider: Send + Sync {
    /// Site serving `url`, matched by host.
    fn site_for_url(&self, url: &str) -> Option<SiteInfo>;

    /// Default download setting id of a site, by name or id.
    fn default_setting_for_site(&self, site: &str) -> Option<String>;
}

/// Config-backed [`SiteProvider`].
pub struct SiteDirectory {
    config: Arc<ConfigStore>,
    sites: RwLock<Arc<Vec<SiteInfo>>>,
}

impl SiteDirectory {
    pub fn new(config: Arc<ConfigStore>) -> Self {
        Self {
            config,
            sites: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Rebuild the site list from the `sites` configuration section.
    pub fn reload(&self) {
        let document = self.config.document();
        let sites: Vec<SiteInfo> = match document.get("sites") {
            Some(value) if !value.is_null() => {
                match serde_json::from_value(value.clone()) {
                    Ok(sites) => sites,
                    Err(e) => {
                        warn!(error = %e, "Ignoring malformed sites section");
                        Vec::new()
                    }
                }
            }
            _ => Vec::new(),
        };
        debug!(count = sites.len(), "Site directory loaded");
        *self.sites.write() = Arc::new(sites);
    }

    pub fn sites(&self) -> Arc<Vec<SiteInfo>> {
        self.sites.read().clone()
    }

    pub fn len(&self) -> usize {
        self.sites.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.read().is_empty()
    }
}

impl SiteProvider for SiteDirectory {
    fn site_for_url(&self, url: &str) -> Option<SiteInfo> {
        let host = host_of(url)?;
        self.sites()
            .iter()
            .find(|site| {
                site.host().is_some_and(|site_host| {
                    host == site_host || host.ends_with(&format!(".{site_host}"))
                })
            })
            .cloned()
    }

    fn default_setting_for_site(&self, site: &str) -> Option<String> {
        self.sites()
            .iter()
            .find(|s| s.name == site || s.id == site)
            .and_then(|s| s.download_setting.clone())
            .filter(|id| !id.is_empty())
    }
}

#[async_trait]
impl Reconfigurable for SiteDirectory {
    fn component(&self) -> &'static str {
        "site_directory"
    }

    async fn reconfigure(&self) -> Result<()> {
        self.reload();
        Ok(())
    }
}

fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}
