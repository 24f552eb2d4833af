//! The host side of installation: where raw code becomes callable.

use crate::error::InstallError;
use kiln_source::Origin;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Host identifier of a loader namespace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LoaderId(pub u64);

/// Host identifier of an isolation anchor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AnchorId(pub u64);

/// Host address of an installed unit's entry point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntryPoint(pub u64);

impl fmt::Display for LoaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// The mechanism that defines generated code in the running host.
///
/// A loader is a namespace: units defined in the same loader can reference
/// each other by name, and a name can be defined only once per loader.
/// Isolated definitions are anonymous and cannot be referenced by other
/// units, which lets the host reclaim them as soon as they are unused.
pub trait InstallTarget: Send + Sync {
    /// Creates a new, empty loader namespace.
    fn create_loader(&self) -> Result<LoaderId, InstallError>;

    /// Whether [`define_isolated`](Self::define_isolated) is supported.
    fn isolation_available(&self) -> bool;

    /// Creates the anchor that isolated units from `origin` are defined against.
    fn create_anchor(&self, origin: &Origin) -> Result<AnchorId, InstallError>;

    /// Defines `code` under `name` in `loader`.
    fn define_named(&self, loader: LoaderId, name: &str, code: &[u8])
        -> Result<EntryPoint, InstallError>;

    /// Defines anonymous `code` against `anchor`.
    fn define_isolated(&self, anchor: AnchorId, code: &[u8]) -> Result<EntryPoint, InstallError>;
}

/// In-process [`InstallTarget`] that records definitions in tables.
///
/// Used by embedders without a native code host, and by tests.
pub struct LocalTarget {
    isolation: bool,
    next_id: AtomicU64,
    loaders: Mutex<HashMap<LoaderId, HashSet<String>>>,
    anchors: Mutex<HashMap<AnchorId, Origin>>,
    isolated_units: AtomicU64,
}

impl LocalTarget {
    /// Creates a target that supports isolation.
    pub fn new() -> Self {
        Self::with_isolation(true)
    }

    /// Creates a target with isolation support switched on or off.
    pub fn with_isolation(isolation: bool) -> Self {
        Self {
            isolation,
            next_id: AtomicU64::new(1),
            loaders: Mutex::new(HashMap::new()),
            anchors: Mutex::new(HashMap::new()),
            isolated_units: AtomicU64::new(0),
        }
    }

    /// Number of loaders created so far.
    pub fn loader_count(&self) -> usize {
        self.loaders.lock().len()
    }

    /// Number of anchors created so far.
    pub fn anchor_count(&self) -> usize {
        self.anchors.lock().len()
    }

    /// Number of units defined in `loader`.
    pub fn units_in(&self, loader: LoaderId) -> usize {
        self.loaders.lock().get(&loader).map_or(0, HashSet::len)
    }

    /// Number of isolated units defined across all anchors.
    pub fn isolated_unit_count(&self) -> u64 {
        self.isolated_units.load(Ordering::Relaxed)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for LocalTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl InstallTarget for LocalTarget {
    fn create_loader(&self) -> Result<LoaderId, InstallError> {
        let id = LoaderId(self.next_id());
        self.loaders.lock().insert(id, HashSet::new());
        Ok(id)
    }

    fn isolation_available(&self) -> bool {
        self.isolation
    }

    fn create_anchor(&self, origin: &Origin) -> Result<AnchorId, InstallError> {
        if !self.isolation {
            return Err(InstallError::IsolationUnavailable);
        }
        let id = AnchorId(self.next_id());
        self.anchors.lock().insert(id, origin.clone());
        Ok(id)
    }

    fn define_named(
        &self,
        loader: LoaderId,
        name: &str,
        code: &[u8],
    ) -> Result<EntryPoint, InstallError> {
        if code.is_empty() {
            return Err(InstallError::Rejected {
                unit: name.to_string(),
                reason: "empty code".to_string(),
            });
        }
        let mut loaders = self.loaders.lock();
        let names = loaders.get_mut(&loader).ok_or_else(|| InstallError::Rejected {
            unit: name.to_string(),
            reason: format!("unknown loader {loader}"),
        })?;
        if !names.insert(name.to_string()) {
            return Err(InstallError::DuplicateUnit {
                loader,
                name: name.to_string(),
            });
        }
        Ok(EntryPoint(self.next_id()))
    }

    fn define_isolated(&self, anchor: AnchorId, code: &[u8]) -> Result<EntryPoint, InstallError> {
        if !self.isolation {
            return Err(InstallError::IsolationUnavailable);
        }
        if !self.anchors.lock().contains_key(&anchor) {
            return Err(InstallError::Rejected {
                unit: "<anonymous>".to_string(),
                reason: format!("unknown anchor {anchor}"),
            });
        }
        if code.is_empty() {
            return Err(InstallError::Rejected {
                unit: "<anonymous>".to_string(),
                reason: "empty code".to_string(),
            });
        }
        self.isolated_units.fetch_add(1, Ordering::Relaxed);
        Ok(EntryPoint(self.next_id()))
    }
}
