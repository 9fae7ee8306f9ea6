//! Error types for the ledger engine.

/// All errors that can occur when using the ledger engine.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// A referenced entity does not exist (or is not visible to the caller).
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity that was looked up.
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// Input failed validation (bad amount, date, month, enum value, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The entity exists but belongs to another organization.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The caller has used up its external classification quota.
    #[error("external classification quota exceeded ({used}/{limit} in window)")]
    QuotaExceeded {
        /// Calls counted in the current window, including the rejected one.
        used: u64,
        /// Maximum calls allowed per window.
        limit: u64,
    },

    /// The external classification service failed or is not configured.
    #[error("external service unavailable: {0}")]
    ExternalServiceUnavailable(String),

    /// The external service answered with a non-success status.
    #[error("API error (HTTP {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// HTTP transport failed.
    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A merchant rule pattern failed to compile.
    #[error("invalid rule pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// Persistence or cache backend failed.
    #[error("storage error: {0}")]
    Storage(Box<dyn core::error::Error + Send + Sync>),
}

impl LedgerError {
    /// Shorthand for [`LedgerError::NotFound`].
    #[inline]
    pub fn not_found<T: core::fmt::Display>(entity: &'static str, id: &T) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for [`LedgerError::InvalidInput`].
    #[inline]
    pub fn invalid<T: Into<String>>(message: T) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Returns `true` for errors callers may reasonably retry.
    #[inline]
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            *self,
            Self::ExternalServiceUnavailable(_) | Self::Storage(_) | Self::Api { .. }
        )
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, LedgerError>;
