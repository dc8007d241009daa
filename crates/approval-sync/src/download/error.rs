use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ProcessError, StorageError};

/// Reporting bucket for a failed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadErrorKind {
    Timeout,
    Network,
    Server,
    Unknown,
}

impl std::fmt::Display for DownloadErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadErrorKind::Timeout => write!(f, "timeout"),
            DownloadErrorKind::Network => write!(f, "network"),
            DownloadErrorKind::Server => write!(f, "server"),
            DownloadErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server responded with HTTP {status}")]
    Server { status: u16 },

    #[error("{0}")]
    Unknown(String),

    #[error("Download cancelled")]
    Cancelled,

    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Archive extraction failed: {0}")]
    ArchiveExtraction(#[source] ProcessError),
}

impl DownloadError {
    /// Bucket for reporting. `None` for cancellation, which is not a failure.
    pub fn kind(&self) -> Option<DownloadErrorKind> {
        match self {
            DownloadError::Timeout(_) => Some(DownloadErrorKind::Timeout),
            DownloadError::Network(_) => Some(DownloadErrorKind::Network),
            DownloadError::Server { .. } => Some(DownloadErrorKind::Server),
            DownloadError::Cancelled => None,
            DownloadError::Unknown(_)
            | DownloadError::Storage(_)
            | DownloadError::ArchiveExtraction(_) => Some(DownloadErrorKind::Unknown),
        }
    }

    pub fn from_status(status: reqwest::StatusCode) -> Self {
        if status.is_server_error() {
            DownloadError::Server {
                status: status.as_u16(),
            }
        } else {
            DownloadError::Unknown(format!(
                "HTTP {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            ))
        }
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(e: reqwest::Error) -> Self {
        let timeout = e.is_timeout();
        let status = e.status();
        let network = e.is_connect() || e.is_request() || e.is_body() || e.is_decode();
        // The URL may carry signed query parameters.
        let message = e.without_url().to_string();

        if timeout {
            DownloadError::Timeout(message)
        } else if let Some(status) = status {
            DownloadError::from_status(status)
        } else if network {
            DownloadError::Network(message)
        } else {
            DownloadError::Unknown(message)
        }
    }
}
