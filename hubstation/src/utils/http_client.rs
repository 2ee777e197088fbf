use std::{sync::OnceLock, time::Duration};

use tracing::{debug, warn};

use crate::{Error, Result};

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate installed one first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Proxy selection for an outgoing client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ProxySetting {
    /// Never use a proxy, ignoring environment settings.
    #[default]
    Disabled,
    /// Use the system/environment proxy.
    System,
    /// Use this proxy URL.
    Url(String),
}

impl ProxySetting {
    /// `Url` for a non-empty URL, `Disabled` otherwise.
    pub fn from_url(url: Option<&str>) -> Self {
        match url.map(str::trim) {
            Some(url) if !url.is_empty() => Self::Url(url.to_string()),
            _ => Self::Disabled,
        }
    }
}

/// Apply `proxy` to an existing `reqwest::ClientBuilder`.
///
/// An invalid proxy URL disables proxying instead of failing the build.
pub fn apply_proxy(builder: reqwest::ClientBuilder, proxy: &ProxySetting) -> reqwest::ClientBuilder {
    match proxy {
        ProxySetting::Disabled => builder.no_proxy(),
        ProxySetting::System => builder,
        ProxySetting::Url(url) => match reqwest::Proxy::all(url) {
            Ok(proxy) => builder.proxy(proxy),
            Err(error) => {
                warn!(
                    proxy_url = %url,
                    error = %error,
                    "Invalid proxy URL; disabling proxy"
                );
                builder.no_proxy()
            }
        },
    }
}

/// Build a client for talking to a backend or a payload host.
pub fn build_client(
    user_agent: Option<&str>,
    proxy: &ProxySetting,
    request_timeout: Duration,
) -> Result<reqwest::Client> {
    install_rustls_provider();

    let mut builder = reqwest::Client::builder();
    if let Some(ua) = user_agent.filter(|ua| !ua.is_empty()) {
        builder = builder.user_agent(ua);
    }
    if request_timeout > Duration::ZERO {
        builder = builder.timeout(request_timeout);
    }
    builder = apply_proxy(builder, proxy);

    builder.build().map_err(Error::from)
}
