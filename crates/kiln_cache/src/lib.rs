//! Cache tiers for compiled script artifacts.
//!
//! [`MemoryCache`] is the bounded, recency-ordered in-process tier whose
//! entries never keep an artifact alive on their own. [`PersistentStore`] is
//! the on-disk tier: records are versioned by runtime version and
//! optimization profile, checksummed, and published atomically. Both tiers
//! are fail-safe; a problem with a cached entry is a miss, never an error for
//! the compile that consulted it.

#![warn(missing_docs)]

pub mod error;
pub mod key;
pub mod memory;
pub mod record;
pub mod store;

pub use error::CacheError;
pub use key::{CacheKey, OptimizationProfile};
pub use memory::MemoryCache;
pub use record::StoredRecord;
pub use store::PersistentStore;
