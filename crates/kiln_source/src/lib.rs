//! Script sources, their cache fingerprints, and byte spans for diagnostics.
//!
//! A [`Source`] is the unit of compilation: text plus the name and origin it
//! was loaded from. Its [`SourceFingerprint`] is the key of every cache tier.

#![warn(missing_docs)]

pub mod fingerprint;
pub mod source;
pub mod span;

pub use fingerprint::SourceFingerprint;
pub use source::{Origin, Source};
pub use span::Span;
