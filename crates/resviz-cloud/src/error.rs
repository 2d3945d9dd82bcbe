//! Error types for resource collection

use crate::model::ResourceKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Run-level errors
///
/// These abort a whole collection run. Failures of a single resource kind are
/// reported as [`FetchError`] inside the result instead.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error(
        "A collection run is already in progress for {identity}/{region} (pid {holder_pid}, since {since}); pass --force to override"
    )]
    DuplicateRun {
        identity: String,
        region: String,
        holder_pid: u32,
        since: DateTime<Utc>,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("No fetcher registered for resource kind: {0}")]
    FetcherNotRegistered(ResourceKind),

    #[error("Cache error: {0}")]
    CacheIo(String),

    #[error("Lock file error: {0}")]
    LockIo(String),

    #[error("Report error: {0}")]
    ReportIo(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    pub fn is_duplicate_run(&self) -> bool {
        matches!(self, CloudError::DuplicateRun { .. })
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

/// Failure of a single resource kind
///
/// A fetch fails as a unit: no partial record list is ever kept alongside one
/// of these.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FetchError {
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("Rate limited: {message}")]
    RateLimited { message: String },

    #[error("Transient network error: {message}")]
    TransientNetwork { message: String },

    #[error("Provider error [{code}]: {message}")]
    Provider { code: String, message: String },

    #[error("Timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
}

impl FetchError {
    pub fn auth(message: impl Into<String>) -> Self {
        FetchError::Auth {
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        FetchError::RateLimited {
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        FetchError::TransientNetwork {
            message: message.into(),
        }
    }

    pub fn provider(code: impl Into<String>, message: impl Into<String>) -> Self {
        FetchError::Provider {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Only throttling and transient network failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::RateLimited { .. } | FetchError::TransientNetwork { .. }
        )
    }

    /// Short machine-readable category
    pub fn category(&self) -> &'static str {
        match self {
            FetchError::Auth { .. } => "auth",
            FetchError::RateLimited { .. } => "rate_limited",
            FetchError::TransientNetwork { .. } => "transient_network",
            FetchError::Provider { .. } => "provider",
            FetchError::Timeout { .. } => "timeout",
        }
    }
}
