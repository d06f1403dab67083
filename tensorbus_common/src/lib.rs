//! tensorbus Common Library
//!
//! This crate provides shared constants, configuration loading and logging
//! setup for all tensorbus workspace crates.
//!
//! # Module Structure
//!
//! - [`consts`] - Protocol and shared memory constants
//! - [`config`] - Configuration loading traits and types
//! - [`logging`] - `tracing` subscriber setup
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! Add to your `Cargo.toml` with alias for shorter imports:
//! ```toml
//! [dependencies]
//! tb = { package = "tensorbus_common", path = "../tensorbus_common" }
//! ```
//!
//! Then import:
//! ```rust
//! use tensorbus_common::consts::*;
//! use tensorbus_common::config::{BusConfig, ConfigLoader};
//! ```

pub mod config;
pub mod consts;
pub mod logging;
pub mod prelude;
