//! Error taxonomy shared by every loader.
//!
//! The set is closed on purpose: callers match on the variant to decide
//! whether a failure is retryable (transport), permanent (configuration),
//! or a data problem (validation). Every variant carries the URL or
//! identifier of the source that failed.

use thiserror::Error;

/// A boxed upstream cause, kept for diagnostics.
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Network/DNS/timeout failure before any HTTP response arrived.
    /// Cancellation of an in-flight request also lands here. Not retried
    /// by this layer.
    #[error("network error while fetching {url}: {message}")]
    Transport {
        url: String,
        message: String,
        #[source]
        source: Option<Cause>,
    },

    /// Non-2xx, non-304 response. A 404 warrants different caller
    /// behavior than a transient 5xx, see [`SyncError::is_not_found`].
    #[error("HTTP {status} from {url}: {message}")]
    HttpStatus {
        url: String,
        status: u16,
        message: String,
    },

    /// The response body failed parsing or schema validation, or was empty.
    #[error("invalid data from {url}: {message}")]
    Validation {
        url: String,
        message: String,
        details: Option<String>,
    },

    /// Loader constructed with missing or contradictory options. Raised
    /// synchronously at construction time, never during a sync.
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl SyncError {
    pub fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn transport_caused(
        url: impl Into<String>,
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
            source: Some(Box::new(cause)),
        }
    }

    pub fn http_status(url: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            message: message.into(),
        }
    }

    pub fn validation(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            url: url.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn validation_detailed(
        url: impl Into<String>,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self::Validation {
            url: url.into(),
            message: message.into(),
            details: Some(details.into()),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// True for an `HttpStatus` carrying a 404. "Not found" and
    /// "transient server failure" warrant different caller behavior.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::HttpStatus { status: 404, .. })
    }

    /// The URL or identifier of the failing source, where one exists.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Transport { url, .. }
            | Self::HttpStatus { url, .. }
            | Self::Validation { url, .. } => Some(url),
            Self::Configuration { .. } => None,
        }
    }
}
