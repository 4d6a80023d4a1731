//! Error types for stream operations.

use thiserror::Error;

use crate::graph::{NodeId, StreamState};

/// Errors raised by the engine.
///
/// All of them are synchronous and reported to the caller of the operation
/// that hit them. The engine never retries or swallows them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The stream is not active; ended streams cannot be written.
    #[error("stream {id} is in state '{state}', should be 'active'")]
    InactiveStream { id: NodeId, state: StreamState },

    /// `set` was called on a derived stream.
    #[error("stream {0} is not a source stream")]
    NotASource(NodeId),

    /// A source stream was asked to evaluate itself. This points at a wiring
    /// bug: sources never have parents that could trigger evaluation.
    #[error("stream {0} does not define an update function")]
    MissingUpdate(NodeId),

    /// A stream from another engine was supplied where a parent was required.
    #[error("stream {0} does not belong to this engine")]
    NotAStream(NodeId),

    /// An evaluation read a stream value as the wrong type.
    #[error("stream {id} does not hold values of type {expected}")]
    TypeMismatch { id: NodeId, expected: &'static str },

    /// Writes nested inside listeners or evaluations went too deep.
    #[error("nested ticks exceeded the configured depth of {limit}")]
    TickDepthExceeded { limit: usize },
}

/// Result type used throughout the crate.
pub type Result<T, E = StreamError> = std::result::Result<T, E>;
