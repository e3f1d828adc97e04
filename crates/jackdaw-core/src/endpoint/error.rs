//! Endpoint error types

use thiserror::Error;

use super::{ThreadId, ValType};

/// Errors raised by endpoint writes, queues and routing
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EndpointError {
    /// Value written with a different type than the endpoint holds
    #[error("Type mismatch: endpoint holds {expected}, got {actual}")]
    TypeMismatch { expected: ValType, actual: ValType },

    /// Text could not be parsed as the endpoint's type
    #[error("Cannot parse {input:?} as {ty}")]
    ParseValue { ty: ValType, input: String },

    /// Operation requires a specific thread
    #[error("{op} must run on the {expected:?} thread (called from {actual:?})")]
    WrongThread {
        op: &'static str,
        expected: ThreadId,
        actual: ThreadId,
    },

    /// A per-thread queue is at capacity
    #[error("{thread:?} queue full ({capacity} entries)")]
    QueueFull { thread: ThreadId, capacity: usize },

    /// No endpoint registered under this route
    #[error("Endpoint not found: {0}")]
    RouteNotFound(String),

    /// Undo entries can only be pushed from the main thread
    #[error("Undo push attempted off the main thread")]
    UndoOffMainThread,
}

/// Result type for endpoint operations
pub type EndpointResult<T> = Result<T, EndpointError>;
