//! Persistent cache keys and optimization profiles.

use kiln_common::ContentHasher;
use kiln_source::SourceFingerprint;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The family of generated code a record belongs to.
///
/// Code compiled with optimistic type assumptions needs runtime feedback
/// that standard code does not, so the two families are stored side by side
/// and never mixed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum OptimizationProfile {
    /// Code generated without optimistic assumptions.
    Standard,
    /// Code generated with optimistic type assumptions.
    Optimistic,
}

impl OptimizationProfile {
    /// Picks the profile matching the `optimistic_types` compile flag.
    pub fn for_flags(optimistic_types: bool) -> Self {
        if optimistic_types {
            OptimizationProfile::Optimistic
        } else {
            OptimizationProfile::Standard
        }
    }

    /// Short tag recorded in headers and mixed into cache keys.
    pub fn tag(self) -> &'static str {
        match self {
            OptimizationProfile::Standard => "std",
            OptimizationProfile::Optimistic => "opt",
        }
    }

    /// Suffix appended to the version directory of this profile's records.
    pub fn dir_suffix(self) -> &'static str {
        match self {
            OptimizationProfile::Standard => "",
            OptimizationProfile::Optimistic => "_opt",
        }
    }
}

impl fmt::Display for OptimizationProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Name of one persisted record.
///
/// Derived from the source fingerprint, the runtime version and the
/// optimization profile, so a change of either marker yields a different key.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives the key of a `kind` record (e.g. `"script"`) for a source.
    pub fn derive(
        kind: &str,
        fingerprint: &SourceFingerprint,
        runtime_version: &str,
        profile: OptimizationProfile,
    ) -> Self {
        let digest = ContentHasher::new()
            .field(fingerprint.identity().as_bytes())
            .field(&[u8::from(fingerprint.is_strict())])
            .field(runtime_version.as_bytes())
            .field(profile.tag().as_bytes())
            .finish();
        CacheKey(format!("{kind}-{digest}"))
    }

    /// Returns the key as a string slice; usable as a file stem.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
