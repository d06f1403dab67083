//! Prelude module for common re-exports.
//!
//! ```rust
//! use tensorbus_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;
pub use crate::logging::init_tracing;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    BusConfig, ConfigError, ConfigLoader, ListenerConfig, QueueConfig, SharedConfig, ShmConfig,
    ShareTensorPolicy,
};

// ─── Protocol Constants ─────────────────────────────────────────────
pub use crate::consts::{BROADCAST_RECEIVER_ID, FIELD_DELIMITER, STOP_MESSAGE};
