//! HTTP payload fetcher.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{COOKIE, REFERER};
use tracing::{debug, warn};

use super::Acquired;
use crate::Result;
use crate::utils::http_client::{ProxySetting, apply_proxy, install_rustls_provider};

const MAX_REDIRECTS: usize = 10;

/// Request options for one acquisition.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub cookie: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub proxy: ProxySetting,
}

/// Downloads a payload from a URL.
#[async_trait]
pub trait PayloadFetcher: Send + Sync {
    /// Fetch `url`. Never fails; problems are reported in [`Acquired::message`].
    async fn acquire(&self, url: &str, options: &FetchOptions) -> Acquired;
}

/// reqwest-backed fetcher.
pub struct HttpPayloadFetcher {
    timeout: Duration,
}

impl HttpPayloadFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for HttpPayloadFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl HttpPayloadFetcher {
    /// Sites may redirect a download link to a magnet URI; redirects to
    /// `magnet:` stop so the location can be read from the response.
    fn client(&self, options: &FetchOptions) -> Result<reqwest::Client> {
        install_rustls_provider();

        let redirects = reqwest::redirect::Policy::custom(|attempt| {
            if attempt.url().scheme() == "magnet" {
                attempt.stop()
            } else if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else {
                attempt.follow()
            }
        });

        let mut builder = reqwest::Client::builder()
            .redirect(redirects)
            .timeout(self.timeout);
        if let Some(ua) = options.user_agent.as_deref().filter(|ua| !ua.is_empty()) {
            builder = builder.user_agent(ua);
        }
        builder = apply_proxy(builder, &options.proxy);
        Ok(builder.build()?)
    }
}

#[async_trait]
impl PayloadFetcher for HttpPayloadFetcher {
    async fn acquire(&self, url: &str, options: &FetchOptions) -> Acquired {
        let client = match self.client(options) {
            Ok(client) => client,
            Err(e) => return Acquired::failed(format!("failed to build HTTP client: {e}")),
        };

        let mut request = client.get(url);
        if let Some(cookie) = options.cookie.as_deref().filter(|c| !c.is_empty()) {
            request = request.header(COOKIE, cookie);
        }
        if let Some(referer) = options.referer.as_deref() {
            request = request.header(REFERER, referer);
        }

        debug!(url, "Fetching payload");
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url, error = %e, "Payload request failed");
                return Acquired::failed(format!("failed to download {url}: {e}"));
            }
        };

        if let Some(location) = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .filter(|loc| loc.starts_with("magnet:"))
        {
            return Acquired::magnet(location);
        }

        let status = response.status();
        if !status.is_success() {
            return Acquired::failed(format!("failed to download {url}: HTTP {status}"));
        }

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return Acquired::failed(format!("failed to read payload from {url}: {e}")),
        };

        if bytes.starts_with(b"magnet:") {
            let uri = String::from_utf8_lossy(&bytes).trim().to_string();
            return Acquired::magnet(uri);
        }
        if bytes.is_empty() {
            return Acquired::failed(format!("{url} returned an empty payload"));
        }

        let acquired = Acquired::torrent(bytes.to_vec());
        if acquired.content.is_none() {
            return Acquired::failed(format!(
                "{url} did not return a torrent, the site cookie may have expired ({})",
                acquired.message
            ));
        }
        acquired
    }
}
