//! Script source text together with its name and origin.

use crate::fingerprint::SourceFingerprint;
use std::fmt;
use std::sync::Arc;

/// Where a source was loaded from (a URL, a path, or a synthetic label).
///
/// Installers group code by origin: repeated compiles of sources from the
/// same origin share one isolation anchor.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Origin(Arc<str>);

impl Origin {
    /// Creates an origin from any string-like value.
    pub fn new(origin: impl AsRef<str>) -> Self {
        Self(Arc::from(origin.as_ref()))
    }

    /// Returns the origin as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A unit of script source submitted for compilation.
///
/// Cloning is cheap: the text and origin are reference counted. The
/// fingerprint is computed once at construction.
#[derive(Clone, Debug)]
pub struct Source {
    name: Arc<str>,
    origin: Origin,
    text: Arc<str>,
    fingerprint: SourceFingerprint,
}

impl Source {
    /// Creates a non-strict source.
    pub fn new(name: impl AsRef<str>, origin: Origin, text: impl AsRef<str>) -> Self {
        Self::with_strict(name, origin, text, false)
    }

    /// Creates a source with an explicit strict flag.
    pub fn with_strict(
        name: impl AsRef<str>,
        origin: Origin,
        text: impl AsRef<str>,
        strict: bool,
    ) -> Self {
        let text: Arc<str> = Arc::from(text.as_ref());
        let fingerprint = SourceFingerprint::compute(&text, origin.as_str(), strict);
        Self {
            name: Arc::from(name.as_ref()),
            origin,
            text,
            fingerprint,
        }
    }

    /// Creates a source whose origin is its name, the common case for
    /// scripts evaluated from strings.
    pub fn from_string(name: impl AsRef<str>, text: impl AsRef<str>) -> Self {
        let origin = Origin::new(name.as_ref());
        Self::new(name, origin, text)
    }

    /// Display name of the source.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Origin the source was loaded from.
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Full source text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length of the text in bytes.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Returns `true` if the text is empty.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Whether the source requests strict mode.
    pub fn is_strict(&self) -> bool {
        self.fingerprint.is_strict()
    }

    /// The cache fingerprint of this source.
    pub fn fingerprint(&self) -> SourceFingerprint {
        self.fingerprint
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
