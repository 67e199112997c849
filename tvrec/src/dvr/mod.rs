//! Remote recordings delegated to the backend's DVR engine.
//!
//! [`DvrClient`] is a stateless request/response wrapper: it never retries
//! and reports every non-success as a typed [`DvrError`]. Whether to retry is
//! the supervisor's (or the user's) decision.

mod models;
mod tvheadend;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use models::{CreateEntry, DvrEntry, EntryCategory, LocalizedText};
pub use tvheadend::TvheadendClient;

/// Errors returned by the backend recording API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DvrError {
    #[error("Backend rejected the request (HTTP {status}): {message}")]
    BackendRejected { status: u16, message: String },

    #[error("Recording entry {0} not found on the backend")]
    NotFound(String),

    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    #[error("Backend request timed out")]
    Timeout,
}

impl DvrError {
    /// Transient network conditions the user may retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Timeout)
    }

    pub(crate) fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Unreachable(e.to_string())
        }
    }
}

/// Backend recording-entry API.
#[async_trait]
pub trait DvrClient: Send + Sync {
    /// Create a recording entry and return its backend identifier.
    async fn create_entry(&self, entry: &CreateEntry) -> Result<String, DvrError>;

    /// Stop a running (or cancel a scheduled) entry.
    async fn stop_entry(&self, entry_id: &str, timeout: Duration) -> Result<(), DvrError>;

    /// All entries the backend knows about.
    async fn list_entries(&self) -> Result<Vec<DvrEntry>, DvrError>;
}
