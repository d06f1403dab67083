//! Loading bus configuration files from disk

use std::io::Write;
use std::time::Duration;
use tensorbus_common::config::{BusConfig, ConfigError, ConfigLoader, LogLevel, ShareTensorPolicy};

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn full_file_overrides_every_section() {
    let file = write_config(
        r#"
[shared]
log_level = "debug"
service_name = "viewer"

[queues]
prefix = "__nn_"
base = "chan"
outbound_id = 3
inbound_id = 4

[shm]
dir = "/tmp/tensorbus-test"
prefix = "viewer"

[listener]
share_tensor = "dispatch"
pop_timeout_ms = 50
"#,
    );

    let config = BusConfig::load_or_default(Some(file.path())).unwrap();
    assert_eq!(config.shared.log_level, LogLevel::Debug);
    assert_eq!(config.shared.service_name, "viewer");
    assert_eq!(config.queues.outbound_queue(), "__nn_chan_3");
    assert_eq!(config.queues.inbound_queue(), "__nn_chan_4");
    assert_eq!(config.shm.dir, std::path::PathBuf::from("/tmp/tensorbus-test"));
    assert_eq!(config.listener.share_tensor, ShareTensorPolicy::Dispatch);
    assert_eq!(config.listener.pop_timeout(), Some(Duration::from_millis(50)));
}

#[test]
fn empty_file_means_defaults() {
    let file = write_config("");
    let config = BusConfig::load_or_default(Some(file.path())).unwrap();
    assert_eq!(config.queues.outbound_queue(), "__tensorbus_queue_0");
    assert_eq!(config.queues.inbound_queue(), "__tensorbus_queue_1");
    assert_eq!(config.listener.pop_timeout(), None);
}

#[test]
fn invalid_files_are_reported() {
    let missing = std::env::temp_dir().join("tensorbus-does-not-exist.toml");
    assert!(matches!(
        BusConfig::load(&missing),
        Err(ConfigError::FileNotFound)
    ));

    let broken = write_config("[queues\nprefix = 1");
    assert!(matches!(
        BusConfig::load_or_default(Some(broken.path())),
        Err(ConfigError::ParseError(_))
    ));

    let clash = write_config("[queues]\noutbound_id = 2\ninbound_id = 2\n");
    assert!(matches!(
        BusConfig::load_or_default(Some(clash.path())),
        Err(ConfigError::ValidationError(_))
    ));

    let bad_policy = write_config("[listener]\nshare_tensor = \"forward\"\n");
    assert!(BusConfig::load_or_default(Some(bad_policy.path())).is_err());
}
