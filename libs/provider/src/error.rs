//! Provider and store errors.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors from store directory templates.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unbalanced braces in store structure {template:?}")]
    UnbalancedBraces { template: String },

    #[error("unknown placeholder {{{name}}} in store structure (expected {{edition}} or {{version}})")]
    UnknownPlaceholder { name: String },

    #[error("store structure renders to an unsafe path component: {component:?}")]
    UnsafeComponent { component: String },
}

/// Errors from edition providers.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),

    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid manifest JSON")]
    Json(#[from] serde_json::Error),

    #[error("manifest references unknown version {version:?} for alias {alias:?}")]
    ManifestAlias { alias: String, version: String },

    #[error("version {0} not found in manifest (oldest supported server)")]
    MissingBaseline(&'static str),

    #[error("version not found: {0}")]
    UnknownVersion(String),

    #[error("version {0} has no server download")]
    NoServerDownload(String),

    #[error("no provider exists for edition {0:?}")]
    UnknownEdition(String),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ProviderError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ProviderError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether retrying later might succeed (network or I/O trouble).
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Http(_) | ProviderError::Io { .. })
    }
}
