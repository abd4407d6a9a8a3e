//! Unified error type for the ad-budget bot.

use thiserror::Error;

/// Classification of spreadsheet API failures.
///
/// Only retryable kinds are retried by the sheets client; everything
/// else fails fast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetErrorKind {
    /// Transport-level failure (connect, DNS, TLS).
    Network,
    /// Request timed out.
    Timeout,
    /// 429 from the API.
    RateLimited,
    /// 5xx from the API.
    Server,
    /// 401 — bad or missing credential.
    Auth,
    /// 403 — credential lacks access to the document.
    Permission,
    /// 404 — document or tab does not exist.
    NotFound,
    /// Malformed request (bad range syntax, other 4xx).
    BadRequest,
    /// Response body did not parse as a value range.
    Malformed,
}

impl SheetErrorKind {
    pub fn retryable(self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::RateLimited | Self::Server
        )
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("ad platform API error (status={status}): {message}")]
    PlatformApi { status: u16, message: String },

    #[error("sheet API error ({kind:?}): {message}")]
    SheetApi {
        kind: SheetErrorKind,
        message: String,
    },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Stale data: {0}")]
    StaleData(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error is worth retrying at the transport layer.
    pub fn retryable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::SheetApi { kind, .. } => kind.retryable(),
            _ => false,
        }
    }
}
