//! Installed, callable compilation results.

use crate::installer::{InstalledUnits, IsolationAnchor, Loader};
use crate::target::{AnchorId, EntryPoint, LoaderId};
use kiln_common::{Constant, ContentHash, UnitInitializer};
use kiln_source::SourceFingerprint;
use std::collections::BTreeMap;
use std::sync::Arc;

/// What keeps an installed unit's host namespace alive.
#[derive(Clone, Debug)]
pub enum InstallOwner {
    /// A shared, named loader.
    Loader(Arc<Loader>),
    /// A per-origin isolation anchor.
    Anchor(Arc<IsolationAnchor>),
}

/// A callable reference to one installed unit.
#[derive(Clone, Debug)]
pub struct CallableHandle {
    name: Arc<str>,
    entry: EntryPoint,
    code_hash: ContentHash,
    owner: InstallOwner,
}

impl CallableHandle {
    pub(crate) fn new(
        name: impl AsRef<str>,
        entry: EntryPoint,
        code_hash: ContentHash,
        owner: InstallOwner,
    ) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            entry,
            code_hash,
            owner,
        }
    }

    /// Name the unit was defined under; empty for isolated units.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry_point(&self) -> EntryPoint {
        self.entry
    }

    /// Hash of the installed code. Handles with equal hashes behave identically.
    pub fn code_hash(&self) -> ContentHash {
        self.code_hash
    }

    pub fn owner(&self) -> &InstallOwner {
        &self.owner
    }

    pub fn is_isolated(&self) -> bool {
        matches!(self.owner, InstallOwner::Anchor(_))
    }

    /// Loader the unit lives in, if it was installed by name.
    pub fn loader_id(&self) -> Option<LoaderId> {
        match &self.owner {
            InstallOwner::Loader(loader) => Some(loader.id()),
            InstallOwner::Anchor(_) => None,
        }
    }

    /// Anchor the unit was defined against, if it was isolated.
    pub fn anchor_id(&self) -> Option<AnchorId> {
        match &self.owner {
            InstallOwner::Anchor(anchor) => Some(anchor.id()),
            InstallOwner::Loader(_) => None,
        }
    }
}

/// An installed nested unit and how to build a callable from it.
#[derive(Clone, Debug)]
pub struct InstalledSubUnit {
    pub handle: CallableHandle,
    pub initializer: UnitInitializer,
}

/// The immutable result of compiling one source.
///
/// Artifacts are shared through [`Arc`]; the in-memory cache only holds them
/// weakly, so an artifact lives exactly as long as some caller keeps it.
#[derive(Debug)]
pub struct CompiledArtifact {
    fingerprint: SourceFingerprint,
    entry: CallableHandle,
    sub_units: BTreeMap<u32, InstalledSubUnit>,
    constants: Arc<[Constant]>,
    compilation_id: u64,
}

impl CompiledArtifact {
    pub(crate) fn new(
        fingerprint: SourceFingerprint,
        installed: InstalledUnits,
        constants: &[Constant],
        compilation_id: u64,
    ) -> Self {
        Self {
            fingerprint,
            entry: installed.entry,
            sub_units: installed.sub_units,
            constants: Arc::from(constants),
            compilation_id,
        }
    }

    pub fn fingerprint(&self) -> SourceFingerprint {
        self.fingerprint
    }

    /// The top-level program's callable.
    pub fn entry(&self) -> &CallableHandle {
        &self.entry
    }

    /// Nested units keyed by function id.
    pub fn sub_units(&self) -> &BTreeMap<u32, InstalledSubUnit> {
        &self.sub_units
    }

    pub fn sub_unit(&self, function_id: u32) -> Option<&InstalledSubUnit> {
        self.sub_units.get(&function_id)
    }

    pub fn constants(&self) -> &[Constant] {
        &self.constants
    }

    /// Id of the compilation that generated this code.
    ///
    /// Artifacts restored from the persistent store keep the id they were
    /// first compiled with.
    pub fn compilation_id(&self) -> u64 {
        self.compilation_id
    }

    pub fn is_isolated(&self) -> bool {
        self.entry.is_isolated()
    }
}
