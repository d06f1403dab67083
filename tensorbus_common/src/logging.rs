//! `tracing` subscriber setup shared by binaries and tests.

use crate::config::LogLevel;
use tracing::Level;
use tracing_subscriber::EnvFilter;

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// Install a global `fmt` subscriber.
///
/// `RUST_LOG` directives take precedence over `level`. A second call is a
/// no-op, so tests may call it freely.
pub fn init_tracing(level: LogLevel, json: bool) {
    let level: Level = level.into();
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true);

    // try_init fails only when a global subscriber already exists
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
