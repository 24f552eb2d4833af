//! Cache identity of a unit of source text.

use kiln_common::{ContentHash, ContentHasher};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identifies a unit of source text for caching purposes.
///
/// The identity hashes the text together with its origin; the length is
/// carried along for size-based policy decisions. Two fingerprints are equal
/// iff their identity and strict flag match, so the length never takes part
/// in equality or hashing.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SourceFingerprint {
    identity: ContentHash,
    length: usize,
    strict: bool,
}

impl SourceFingerprint {
    /// Computes the fingerprint of `text` loaded from `origin`.
    pub fn compute(text: &str, origin: &str, strict: bool) -> Self {
        let identity = ContentHasher::new()
            .field(text.as_bytes())
            .field(origin.as_bytes())
            .finish();
        Self {
            identity,
            length: text.len(),
            strict,
        }
    }

    /// The content-and-origin hash.
    pub fn identity(&self) -> ContentHash {
        self.identity
    }

    /// Length of the source text in bytes.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Whether the source is compiled in strict mode.
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// The same source identity compiled with a different strict flag.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

impl PartialEq for SourceFingerprint {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity && self.strict == other.strict
    }
}

impl Eq for SourceFingerprint {}

impl Hash for SourceFingerprint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
        self.strict.hash(state);
    }
}

impl fmt::Display for SourceFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identity)?;
        if self.strict {
            write!(f, "+strict")?;
        }
        Ok(())
    }
}
