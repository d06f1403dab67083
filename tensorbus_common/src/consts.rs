//! System-wide constants for the tensorbus workspace.
//!
//! Single source of truth for queue naming, protocol literals and shared
//! memory limits. Imported by all crates.

/// Field delimiter of every wire message and handle.
pub const FIELD_DELIMITER: &str = "::";

/// Delimiter between the dimensions of an encoded shape.
pub const DIMS_DELIMITER: char = ',';

/// Fully encoded sentinel message terminating a listener.
pub const STOP_MESSAGE: &str = "stop::";

/// Receiver id carried by `const` messages meaning "broadcast".
pub const BROADCAST_RECEIVER_ID: i32 = 1;

/// Default prefix of every queue name.
pub const DEFAULT_QUEUE_PREFIX: &str = "__tensorbus_";

/// Default queue base name, suffixed with `_{receiver_id}`.
pub const DEFAULT_QUEUE_BASE: &str = "queue";

/// Receiver id of the queue consumers listen on.
pub const DEFAULT_OUTBOUND_ID: i32 = 0;

/// Receiver id of the queue the publishing process listens on.
pub const DEFAULT_INBOUND_ID: i32 = 1;

/// Default directory holding shared memory segment files.
pub const DEFAULT_SHM_DIR: &str = "/dev/shm";

/// Default file name prefix of segments created by this workspace.
pub const DEFAULT_SHM_PREFIX: &str = "tensorbus";

/// Maximum tensor payload held by one segment (1GB).
pub const SHM_MAX_SIZE: usize = 1_073_741_824;

/// CPU cache line size in bytes.
pub const CACHE_LINE_SIZE: usize = 64;

/// Default service name.
pub const DEFAULT_SERVICE_NAME: &str = "tensorbus";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_message_is_command_plus_delimiter() {
        assert_eq!(STOP_MESSAGE, format!("stop{FIELD_DELIMITER}"));
    }

    #[test]
    fn default_queues_are_distinct() {
        assert_ne!(DEFAULT_OUTBOUND_ID, DEFAULT_INBOUND_ID);
    }

    #[test]
    fn test_cache_line_size() {
        assert_eq!(CACHE_LINE_SIZE, 64);
    }
}
