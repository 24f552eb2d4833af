//! Parsing and validation of `kiln.toml` runtime configuration.
//!
//! This crate reads the runtime configuration file and produces a strongly
//! typed [`RuntimeConfig`] covering the cache tiers, compile flags, and the
//! installer policy. Every section is optional; an empty file yields the
//! defaults.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, validate_config};
pub use types::*;
