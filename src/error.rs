//! Error taxonomy for catalog and asset operations.
//!
//! Every outcome the calling tier must distinguish is a variant here:
//! validation failures, uniqueness violations, unknown ids, asset store
//! failures, and catalog connectivity failures. A *compensation* failure
//! (a cleanup action that itself failed) is deliberately not a variant —
//! it is surfaced as a `tracing::warn!` and never changes the primary
//! outcome already decided for the caller.

use thiserror::Error;

/// Result type used across the engine.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Typed outcome of a catalog or asset operation.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A required field was missing or malformed.
    #[error("validation failed for {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// The product code is already taken by another record.
    #[error("product code '{0}' already exists")]
    DuplicateCode(String),

    /// No product with the given id.
    #[error("product not found")]
    NotFound,

    /// An asset store call failed (network, auth, or deadline exceeded).
    #[error("asset store operation failed: {0}")]
    UploadFailed(String),

    /// The catalog store could not be reached; the current unit of work
    /// was aborted with nothing committed.
    #[error("catalog store unavailable: {0}")]
    StoreUnavailable(String),
}

impl CatalogError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn upload(message: impl Into<String>) -> Self {
        Self::UploadFailed(message.into())
    }
}

impl From<sqlx::Error> for CatalogError {
    /// Catch-all for catalog I/O failures. Unique-constraint violations are
    /// distinguished at the write sites, where the offending code is known.
    fn from(e: sqlx::Error) -> Self {
        Self::StoreUnavailable(e.to_string())
    }
}
