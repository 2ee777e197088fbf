//! Payload acquisition.
//!
//! Turns a request's link or local file into content a backend can accept.

pub mod fetcher;
pub mod torrent;

pub use fetcher::{FetchOptions, HttpPayloadFetcher, PayloadFetcher};
pub use torrent::{TorrentLayout, read_layout};

use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

/// Content handed to a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadContent {
    /// A magnet URI, passed through verbatim.
    Magnet(String),
    /// Raw `.torrent` bytes.
    Torrent(Vec<u8>),
}

impl PayloadContent {
    /// A loggable description: the URI for magnets, a size for torrents.
    pub fn describe(&self) -> String {
        match self {
            Self::Magnet(uri) => uri.clone(),
            Self::Torrent(bytes) => format!("<torrent, {} bytes>", bytes.len()),
        }
    }

    /// Base64 of the torrent bytes, for RPC interfaces that take metainfo inline.
    pub fn metainfo_base64(&self) -> Option<String> {
        match self {
            Self::Torrent(bytes) => Some(STANDARD.encode(bytes)),
            Self::Magnet(_) => None,
        }
    }
}

/// Result of acquiring a payload.
///
/// `content` is `None` when acquisition failed; `message` then explains why.
/// A non-empty `message` next to some content is a warning.
#[derive(Debug, Clone, Default)]
pub struct Acquired {
    pub content: Option<PayloadContent>,
    pub folder: Option<String>,
    pub files: Vec<String>,
    pub message: String,
}

impl Acquired {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn magnet(uri: impl Into<String>) -> Self {
        Self {
            content: Some(PayloadContent::Magnet(uri.into())),
            ..Self::default()
        }
    }

    /// Wrap torrent bytes, reading their layout. Bytes that are not a
    /// torrent (a login page, say) fail acquisition.
    pub fn torrent(bytes: Vec<u8>) -> Self {
        match read_layout(&bytes) {
            Ok(layout) => Self {
                content: Some(PayloadContent::Torrent(bytes)),
                folder: layout.folder,
                files: layout.files,
                message: String::new(),
            },
            Err(e) => Self::failed(e.to_string()),
        }
    }
}

/// Read a local `.torrent` file.
pub async fn read_local(path: &Path) -> Acquired {
    match tokio::fs::read(path).await {
        Ok(bytes) if bytes.is_empty() => {
            Acquired::failed(format!("torrent file {} is empty", path.display()))
        }
        Ok(bytes) => Acquired::torrent(bytes),
        Err(e) => Acquired::failed(format!("failed to read {}: {e}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_local_missing_file() {
        let acquired = read_local(Path::new("/definitely/not/here.torrent")).await;
        assert!(acquired.content.is_none());
        assert!(acquired.message.contains("here.torrent"));
    }

    #[tokio::test]
    async fn test_read_local_torrent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.torrent");
        std::fs::write(
            &path,
            b"d4:infod6:lengthi3e4:name5:a.mkv12:piece lengthi1e6:pieces0:ee",
        )
        .unwrap();

        let acquired = read_local(&path).await;
        assert!(matches!(acquired.content, Some(PayloadContent::Torrent(_))));
        assert_eq!(acquired.files, vec!["a.mkv"]);
        assert!(acquired.message.is_empty());
    }

    #[test]
    fn test_describe_hides_torrent_bytes() {
        assert_eq!(
            PayloadContent::Torrent(vec![0; 4]).describe(),
            "<torrent, 4 bytes>"
        );
        assert_eq!(PayloadContent::Magnet("magnet:?xt=1".into()).describe(), "magnet:?xt=1");
    }
}
