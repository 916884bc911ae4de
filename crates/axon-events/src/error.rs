//! Event bus error types.

use thiserror::Error;

/// Errors from event bus operations.
///
/// Every variant signals an immediate contract violation by the caller; none
/// are transient and none should be retried.
#[derive(Debug, Error)]
pub enum EventError {
    /// The named event is not part of the bus's fixed registry.
    #[error("no such event: {0}")]
    UnknownEvent(String),

    /// The handler is already attached to the event.
    #[error("handler already attached to event: {0}")]
    DuplicateHandler(String),

    /// The handler is not attached to the event.
    #[error("handler not attached to event: {0}")]
    HandlerNotAttached(String),
}

/// Result type for event bus operations.
pub type EventResult<T> = Result<T, EventError>;
