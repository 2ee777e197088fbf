//! Application-wide error types.

use std::path::PathBuf;

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// The configuration file is absent and no baseline template could be
    /// resolved. The process cannot continue.
    #[error("configuration file {path} does not exist and no baseline template is available")]
    ConfigMissing { path: PathBuf },

    #[error("failed to parse configuration {path}: {reason}")]
    ConfigParse { path: PathBuf, reason: String },

    #[error("empty link")]
    EmptyLink,

    #[error("{0}")]
    BackendUnavailable(String),

    #[error("{0}")]
    SubmissionRejected(String),

    #[error("{0}")]
    AcquisitionFailed(String),

    #[error("failed to construct {backend_type} adapter: {reason}")]
    AdapterConstruction {
        backend_type: String,
        reason: String,
    },

    #[error("{backend} request failed: {reason}")]
    Backend { backend: String, reason: String },

    #[error("unexpected internal failure: {0}")]
    UnexpectedInternal(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yml::Error),

    #[error("File watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("IO error while {op} {path}: {source}")]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn io_path(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.into(),
            source,
        }
    }

    pub fn backend(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    pub fn adapter_construction(backend_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AdapterConstruction {
            backend_type: backend_type.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error must stop the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConfigMissing { .. })
    }
}
