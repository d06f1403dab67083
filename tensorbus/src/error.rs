//! Error types for the tensor bus

use crate::dtype::{Dtype, ElementType};
use tensorbus_common::config::ConfigError;
use tensorbus_shm::ShmError;
use thiserror::Error;

/// Failures reported by a [`Broker`](crate::broker::Broker) implementation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// The broker connection is gone; no further push or pop succeeds
    #[error("Broker connection closed")]
    Disconnected,

    /// Transport level failure
    #[error("Broker I/O error: {0}")]
    Io(String),
}

/// Errors surfaced by stores, codecs and the listener.
///
/// None of these are retried internally. Allocator, broker and
/// configuration failures are carried through unchanged.
#[derive(Debug, Error)]
pub enum BusError {
    /// Non-overwrite publish with a shape differing from the stored entry
    #[error(
        "Shape of given tensor {actual:?} does not correspond to shared memory storage `{name}`: {expected:?}"
    )]
    ShapeMismatch {
        /// Tensor name
        name: String,
        /// Shape of the stored entry
        expected: Vec<usize>,
        /// Shape of the submitted tensor
        actual: Vec<usize>,
    },

    /// Non-overwrite publish with an element type differing from the stored entry
    #[error(
        "Dtype of given tensor {actual} does not correspond to shared memory storage `{name}`: {expected}"
    )]
    DtypeMismatch {
        /// Tensor name
        name: String,
        /// Element type of the stored entry
        expected: ElementType,
        /// Element type of the submitted tensor
        actual: ElementType,
    },

    /// Handle string with a wrong field count, dtype tag or dimension
    #[error("Malformed tensor handle {handle:?}: {reason}")]
    MalformedHandle {
        /// Offending handle string
        handle: String,
        /// What failed to parse
        reason: String,
    },

    /// Wire message that does not follow the protocol
    #[error("Protocol error in message {message:?}: {reason}")]
    Protocol {
        /// Offending raw message
        message: String,
        /// What failed to parse
        reason: String,
    },

    /// Command routed to the callback registry without a registered callback
    #[error("No handler registered for command `{command}`")]
    UnknownCommand {
        /// Command prefix of the message
        command: String,
    },

    /// Handle export requested for a tensor living in process memory
    #[error("Supplied tensor is not in shared memory")]
    NotShared,

    /// Tensor bytes inconsistent with its shape and element type
    #[error("Invalid tensor: {0}")]
    InvalidTensor(String),

    /// Handle whose dtype cannot be reinterpreted by a consumer
    #[error("Tensor handle dtype `{0}` cannot be mapped")]
    UnsupportedDtype(Dtype),

    /// Operation needs a publisher but the store was built without one
    #[error("`{operation}` requires a store connected to a publisher")]
    Detached {
        /// Operation name
        operation: &'static str,
    },

    /// Segment allocator failure
    #[error(transparent)]
    Shm(#[from] ShmError),

    /// Broker failure
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Configuration failure
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Thread spawn failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for bus operations
pub type BusResult<T> = Result<T, BusError>;
