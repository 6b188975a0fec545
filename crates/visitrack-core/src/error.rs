//! Error types for visitrack
//!
//! Provides error handling for:
//! - Local key-value persistence
//! - Remote tracking service calls
//! - Ledger state transitions
//! - Configuration loading
//!
//! None of these interrupt navigation; callers log and degrade.

use crate::types::LedgerState;

/// Umbrella error type
#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    /// Local storage failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Remote tracking service failed
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Ledger rejected the operation
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Configuration invalid
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Local key-value storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Underlying file I/O failed
    #[error("i/o failed on {path}: {source}")]
    Io {
        /// File involved
        path: String,
        /// Cause
        #[source]
        source: std::io::Error,
    },

    /// Store contents could not be encoded
    #[error("encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Store is not accepting writes
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Wrap an I/O error with the path it concerns
    #[inline]
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Remote tracking service errors
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Transport-level failure (connect, DNS, TLS, body read)
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("unexpected status {status} from {url}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Record does not exist remotely
    #[error("visitor not found: {0}")]
    NotFound(String),

    /// Response body was not the expected JSON
    #[error("malformed response: {0}")]
    Decode(String),

    /// Base URL cannot carry path segments
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// No answer within the configured bound
    #[error("request timed out after {timeout_ms}ms")]
    Timeout {
        /// Bound that elapsed
        timeout_ms: u64,
    },

    /// Service unreachable (used by offline/test backends)
    #[error("service unreachable: {0}")]
    Unreachable(String),
}

impl RemoteError {
    /// Failure is expected to clear on its own (network blip, 5xx, timeout)
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout { .. } | Self::Unreachable(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::NotFound(_) | Self::Decode(_) | Self::InvalidUrl(_) => false,
        }
    }

    /// Remote has no record for the requested visitor
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Status { status: 404, .. })
    }
}

/// Visit ledger errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Operation requires a `Ready` ledger
    #[error("ledger not ready (state: {0:?})")]
    NotReady(LedgerState),

    /// Phase change not in the transition table
    #[error("illegal ledger transition {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current phase
        from: LedgerState,
        /// Requested phase
        to: LedgerState,
    },
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read {path}: {source}")]
    Read {
        /// File involved
        path: String,
        /// Cause
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value failed validation
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

impl ConfigError {
    /// Create validation error
    #[inline]
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
