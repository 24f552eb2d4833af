//! Shared foundational types used across the kiln runtime.
//!
//! This crate provides content hashing, the raw compiled-unit types exchanged
//! between the code generator, the persistent store and the installers, and
//! the runtime version marker embedded in persisted records.

#![warn(missing_docs)]

pub mod hash;
pub mod units;

pub use hash::{ContentHash, ContentHasher};
pub use units::{CompiledUnits, Constant, RawSubUnit, RawUnit, UnitInitializer};

/// Version of the running compiler/runtime.
///
/// Persisted records carry this marker; a record written by a different
/// version is treated as absent.
pub const RUNTIME_VERSION: &str = env!("CARGO_PKG_VERSION");
