//! Error types for shared memory operations

use thiserror::Error;

/// Errors that can occur during shared memory operations
#[derive(Error, Debug)]
pub enum ShmError {
    /// Segment file already exists
    #[error("Segment already exists: {name}")]
    AlreadyExists {
        /// Segment name
        name: String,
    },

    /// Segment file not found
    #[error("Segment not found: {name}")]
    NotFound {
        /// Segment name
        name: String,
    },

    /// Payload does not fit the segment
    #[error("Invalid segment size: {size} bytes (segment holds {capacity})")]
    InvalidSize {
        /// Attempted size in bytes
        size: usize,
        /// Data section size of the segment
        capacity: usize,
    },

    /// Reader kept observing concurrent writes
    #[error("Version conflict detected - retry recommended")]
    VersionConflict,

    /// Segment is not backed by shared memory owned by this allocator
    #[error("Segment is not shared by this allocator: {segment}")]
    NotShared {
        /// Segment reference
        segment: String,
    },

    /// Header magic or size is inconsistent with the file
    #[error("Invalid segment header in {name}: {reason}")]
    InvalidHeader {
        /// Segment name
        name: String,
        /// What failed validation
        reason: String,
    },

    /// IO error
    #[error("IO error: {source}")]
    Io {
        /// Source IO error
        #[from]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {source}")]
    Json {
        /// Source JSON error
        #[from]
        source: serde_json::Error,
    },
}

/// Result type for shared memory operations
pub type ShmResult<T> = Result<T, ShmError>;
