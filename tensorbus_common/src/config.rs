//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load TOML configuration files
//! across all tensorbus processes.
//!
//! # Usage
//!
//! ```rust,no_run
//! use tensorbus_common::config::{BusConfig, ConfigError, ConfigLoader};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = BusConfig::load(Path::new("tensorbus.toml"))?;
//!     config.validate()?;
//!     println!("Outbound queue: {}", config.queues.outbound_queue());
//!     Ok(())
//! }
//! ```

use crate::consts::{
    DEFAULT_INBOUND_ID, DEFAULT_OUTBOUND_ID, DEFAULT_QUEUE_BASE, DEFAULT_QUEUE_PREFIX,
    DEFAULT_SERVICE_NAME, DEFAULT_SHM_DIR, DEFAULT_SHM_PREFIX,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

/// Common configuration fields shared across all tensorbus processes.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "viewer-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Process instance identifier.
    pub service_name: String,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
        }
    }
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Queue naming: `{prefix}{base}_{receiver_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Prefix shared by every queue of this bus.
    pub prefix: String,
    /// Base name suffixed with the receiver id.
    pub base: String,
    /// Receiver id of the queue publishers push announcements to.
    pub outbound_id: i32,
    /// Receiver id of the queue the publishing process listens on.
    pub inbound_id: i32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_QUEUE_PREFIX.to_string(),
            base: DEFAULT_QUEUE_BASE.to_string(),
            outbound_id: DEFAULT_OUTBOUND_ID,
            inbound_id: DEFAULT_INBOUND_ID,
        }
    }
}

impl QueueConfig {
    /// Queue name for a receiver id.
    pub fn queue_name(&self, receiver_id: i32) -> String {
        format!("{}{}_{}", self.prefix, self.base, receiver_id)
    }

    /// Queue announcements are pushed to.
    pub fn outbound_queue(&self) -> String {
        self.queue_name(self.outbound_id)
    }

    /// Queue the publishing process listens on.
    pub fn inbound_queue(&self) -> String {
        self.queue_name(self.inbound_id)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prefix.is_empty() || self.base.is_empty() {
            return Err(ConfigError::ValidationError(
                "queue prefix and base cannot be empty".to_string(),
            ));
        }
        if self.outbound_id == self.inbound_id {
            return Err(ConfigError::ValidationError(format!(
                "outbound_id and inbound_id must differ (both {})",
                self.inbound_id
            )));
        }
        Ok(())
    }
}

/// Location and naming of shared memory segment files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShmConfig {
    /// Directory holding segment files.
    pub dir: PathBuf,
    /// File name prefix of segments created by this process.
    pub prefix: String,
}

impl Default for ShmConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_SHM_DIR),
            prefix: DEFAULT_SHM_PREFIX.to_string(),
        }
    }
}

impl ShmConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prefix.is_empty() || self.prefix.contains('/') {
            return Err(ConfigError::ValidationError(format!(
                "shm prefix must be a non-empty file name component, got {:?}",
                self.prefix
            )));
        }
        Ok(())
    }
}

/// What a listener does with `share_tensor` announcements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ShareTensorPolicy {
    /// Drop them; tensor consumption happens elsewhere.
    #[default]
    Ignore,
    /// Route them to the registered callback, failing if none exists.
    Dispatch,
}

/// Receive loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ListenerConfig {
    /// Handling of `share_tensor` messages.
    pub share_tensor: ShareTensorPolicy,
    /// Blocking pop timeout in milliseconds; 0 blocks forever.
    pub pop_timeout_ms: u64,
}

impl ListenerConfig {
    /// Pop timeout, `None` meaning infinite.
    pub fn pop_timeout(&self) -> Option<Duration> {
        (self.pop_timeout_ms > 0).then(|| Duration::from_millis(self.pop_timeout_ms))
    }
}

/// Complete configuration of one tensorbus process.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// service_name = "trainer"
///
/// [queues]
/// prefix = "__tensorbus_"
/// outbound_id = 0
/// inbound_id = 1
///
/// [listener]
/// share_tensor = "dispatch"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusConfig {
    /// Logging and identity.
    #[serde(default)]
    pub shared: SharedConfig,
    /// Queue naming.
    #[serde(default)]
    pub queues: QueueConfig,
    /// Segment files.
    #[serde(default)]
    pub shm: ShmConfig,
    /// Receive loop.
    #[serde(default)]
    pub listener: ListenerConfig,
}

impl BusConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.queues.validate()?;
        self.shm.validate()
    }

    /// Load from `path` when given, otherwise use defaults; validated either way.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }

    #[test]
    fn test_log_level_deserialization() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct TestWrapper {
            level: LogLevel,
        }

        assert_eq!(
            toml::from_str::<TestWrapper>("level = \"trace\"")
                .unwrap()
                .level,
            LogLevel::Trace
        );
        assert_eq!(
            toml::from_str::<TestWrapper>("level = \"warn\"")
                .unwrap()
                .level,
            LogLevel::Warn
        );
    }

    #[test]
    fn test_queue_names() {
        let queues = QueueConfig::default();
        assert_eq!(queues.outbound_queue(), "__tensorbus_queue_0");
        assert_eq!(queues.inbound_queue(), "__tensorbus_queue_1");
        assert_eq!(queues.queue_name(7), "__tensorbus_queue_7");
    }

    #[test]
    fn test_queue_validation_rejects_same_ids() {
        let queues = QueueConfig {
            inbound_id: 0,
            ..QueueConfig::default()
        };
        assert!(matches!(
            queues.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_shm_validation_rejects_slash() {
        let shm = ShmConfig {
            prefix: "a/b".to_string(),
            ..ShmConfig::default()
        };
        assert!(shm.validate().is_err());
        assert!(ShmConfig::default().validate().is_ok());
    }

    #[test]
    fn test_shared_config_validation_empty_service_name() {
        let config = SharedConfig {
            log_level: LogLevel::Info,
            service_name: "".to_string(),
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_pop_timeout_zero_is_infinite() {
        assert_eq!(ListenerConfig::default().pop_timeout(), None);
        let config = ListenerConfig {
            pop_timeout_ms: 250,
            ..ListenerConfig::default()
        };
        assert_eq!(config.pop_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_config_loader_file_not_found() {
        let result = BusConfig::load(Path::new("/nonexistent/path/tensorbus.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn test_config_loader_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid toml {{{{").unwrap();

        let result = BusConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_bus_config_partial_file_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[shared]
log_level = "debug"
service_name = "viewer"

[listener]
share_tensor = "dispatch"
pop_timeout_ms = 100
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = BusConfig::load(file.path()).unwrap();
        assert_eq!(config.shared.log_level, LogLevel::Debug);
        assert_eq!(config.shared.service_name, "viewer");
        assert_eq!(config.listener.share_tensor, ShareTensorPolicy::Dispatch);
        assert_eq!(config.queues, QueueConfig::default());
        assert_eq!(config.shm.dir, PathBuf::from("/dev/shm"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_or_default_without_path() {
        let config = BusConfig::load_or_default(None).unwrap();
        assert_eq!(config.shared.service_name, "tensorbus");
    }
}
