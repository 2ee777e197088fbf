//! Backend clients.

mod aria2;
mod qbittorrent;
mod transmission;

pub use aria2::{Aria2Adapter, Aria2Factory};
pub use qbittorrent::{QBittorrentAdapter, QBittorrentFactory};
pub use transmission::{TransmissionAdapter, TransmissionFactory};

use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::{Error, Result};

/// Connection parameters stored with a backend profile.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionParams {
    #[serde(default)]
    pub host: String,
    #[serde(default, deserialize_with = "de_port")]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// RPC secret, for backends that use token authentication.
    #[serde(default)]
    pub secret: Option<String>,
}

/// Ports are stored as numbers or numeric strings.
fn de_port<'de, D>(deserializer: D) -> std::result::Result<Option<u16>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

impl ConnectionParams {
    pub fn from_value(backend: &str, value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| Error::adapter_construction(backend, format!("invalid connection parameters: {e}")))
    }

    /// Base URL of the backend, `http://` assumed when no scheme is given.
    pub fn base_url(&self, backend: &str) -> Result<Url> {
        let host = self.host.trim().trim_end_matches('/');
        if host.is_empty() {
            return Err(Error::adapter_construction(backend, "host is not configured"));
        }
        let with_scheme = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("http://{host}")
        };
        let mut url = Url::parse(&with_scheme)
            .map_err(|e| Error::adapter_construction(backend, format!("invalid host {host}: {e}")))?;
        if let Some(port) = self.port {
            url.set_port(Some(port))
                .map_err(|_| Error::adapter_construction(backend, format!("invalid port {port}")))?;
        }
        Ok(url)
    }

    pub fn credentials(&self) -> Option<(&str, &str)> {
        let username = self.username.as_deref().filter(|u| !u.is_empty())?;
        Some((username, self.password.as_deref().unwrap_or_default()))
    }
}

/// Join `path` onto `base`, keeping any path prefix `base` already has.
pub(crate) fn endpoint(base: &Url, path: &str) -> Url {
    let prefix = base.path().trim_end_matches('/');
    let mut url = base.clone();
    url.set_path(&format!("{prefix}/{}", path.trim_start_matches('/')));
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_base_url_defaults_scheme() {
        let params =
            ConnectionParams::from_value("transmission", &json!({"host": "nas.local", "port": "9091"}))
                .unwrap();
        assert_eq!(
            params.base_url("transmission").unwrap().as_str(),
            "http://nas.local:9091/"
        );
    }

    #[test]
    fn test_base_url_requires_host() {
        let params = ConnectionParams::from_value("qbittorrent", &json!({"port": 8080})).unwrap();
        let err = params.base_url("qbittorrent").unwrap_err();
        assert!(matches!(err, Error::AdapterConstruction { .. }));
    }

    #[test]
    fn test_endpoint_keeps_prefix() {
        let base = Url::parse("https://box.example/qb/").unwrap();
        assert_eq!(
            endpoint(&base, "/api/v2/auth/login").as_str(),
            "https://box.example/qb/api/v2/auth/login"
        );
    }
}
