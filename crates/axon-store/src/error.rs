//! Property store error types.

use thiserror::Error;

/// Errors from property store operations.
///
/// Every variant signals an immediate contract violation by the caller; none
/// are transient and none should be retried.
#[derive(Debug, Error)]
pub enum StoreError {
    /// One or more requested keys are not part of the store's fixed registry.
    ///
    /// Multi-key operations collect every offending key before failing, so
    /// one error names the full set.
    #[error("no such property: {}", .keys.join(", "))]
    UnknownProperty {
        /// The unregistered keys, in request order.
        keys: Vec<String>,
    },

    /// The handler is already subscribed to the property.
    #[error("handler already subscribed to property: {0}")]
    DuplicateHandler(String),

    /// The handler is not subscribed to the property.
    #[error("handler not subscribed to property: {0}")]
    HandlerNotAttached(String),
}

impl StoreError {
    /// Build an [`UnknownProperty`](Self::UnknownProperty) error for one key.
    pub(crate) fn unknown(key: &str) -> Self {
        Self::UnknownProperty {
            keys: vec![key.to_string()],
        }
    }
}

/// Result type for property store operations.
pub type StoreResult<T> = Result<T, StoreError>;
