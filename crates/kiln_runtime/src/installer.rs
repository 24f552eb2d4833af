//! Installers turn raw units into callable handles.
//!
//! Two strategies exist. A [`ReusableInstaller`] defines every unit by name
//! in one shared loader, so multi-unit results can link against each other;
//! it wears out after a bounded number of units or bytes and is then
//! replaced by a fresh one. An [`IsolatedInstaller`] defines a single
//! anonymous unit against a per-origin anchor, which lets the host reclaim
//! the code independently, but it cannot link units together.

use crate::artifact::{CallableHandle, InstallOwner, InstalledSubUnit};
use crate::collaborator::Verifier;
use crate::error::InstallError;
use crate::target::{AnchorId, InstallTarget, LoaderId};
use kiln_common::{CompiledUnits, RawUnit};
use kiln_config::InstallerConfig;
use kiln_source::Origin;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Bounds after which a reusable installer is replaced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReuseLimits {
    pub max_uses: u32,
    pub max_bytes: usize,
}

impl From<&InstallerConfig> for ReuseLimits {
    fn from(config: &InstallerConfig) -> Self {
        Self {
            max_uses: config.max_uses,
            max_bytes: config.max_bytes,
        }
    }
}

impl Default for ReuseLimits {
    fn default() -> Self {
        Self::from(&InstallerConfig::default())
    }
}

/// A named loader namespace in the host.
#[derive(Debug)]
pub struct Loader {
    id: LoaderId,
}

impl Loader {
    pub fn id(&self) -> LoaderId {
        self.id
    }
}

/// The host handle isolated units from one origin are defined against.
///
/// Held weakly by the [`AnchorCache`](crate::AnchorCache) and strongly by
/// every handle installed against it.
#[derive(Debug)]
pub struct IsolationAnchor {
    id: AnchorId,
    origin: Origin,
}

impl IsolationAnchor {
    pub(crate) fn new(id: AnchorId, origin: Origin) -> Self {
        Self { id, origin }
    }

    pub fn id(&self) -> AnchorId {
        self.id
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }
}

/// Handles produced by one install.
#[derive(Debug)]
pub struct InstalledUnits {
    pub entry: CallableHandle,
    pub sub_units: BTreeMap<u32, InstalledSubUnit>,
}

/// Installs units by name into one shared loader until worn out.
#[derive(Debug)]
pub struct ReusableInstaller {
    loader: Arc<Loader>,
    usage_count: u32,
    bytes_installed: usize,
    limits: ReuseLimits,
}

impl ReusableInstaller {
    /// Creates an installer with a fresh loader from `target`.
    pub fn new(target: &dyn InstallTarget, limits: ReuseLimits) -> Result<Self, InstallError> {
        let id = target.create_loader()?;
        debug!(loader = %id, "created loader");
        Ok(Self {
            loader: Arc::new(Loader { id }),
            usage_count: 0,
            bytes_installed: 0,
            limits,
        })
    }

    pub fn loader_id(&self) -> LoaderId {
        self.loader.id
    }

    /// Units defined so far.
    pub fn usage_count(&self) -> u32 {
        self.usage_count
    }

    /// Code bytes defined so far.
    pub fn bytes_installed(&self) -> usize {
        self.bytes_installed
    }

    pub fn limits(&self) -> ReuseLimits {
        self.limits
    }

    /// Returns `true` once either bound has been reached.
    ///
    /// An exhausted installer may still finish the install in progress; it
    /// is only replaced before the next one.
    pub fn is_exhausted(&self) -> bool {
        self.usage_count >= self.limits.max_uses || self.bytes_installed >= self.limits.max_bytes
    }

    fn define(
        &mut self,
        target: &dyn InstallTarget,
        unit: &RawUnit,
        script_id: u64,
    ) -> Result<CallableHandle, InstallError> {
        // distinct compiles of the same script must not collide in one loader
        let qualified = format!("{}${}", unit.name, script_id);
        let entry = target.define_named(self.loader.id, &qualified, &unit.bytes)?;
        self.usage_count += 1;
        self.bytes_installed += unit.bytes.len();
        Ok(CallableHandle::new(
            qualified,
            entry,
            unit.code_hash(),
            InstallOwner::Loader(Arc::clone(&self.loader)),
        ))
    }

    fn install(
        &mut self,
        target: &dyn InstallTarget,
        units: &CompiledUnits,
        script_id: u64,
    ) -> Result<InstalledUnits, InstallError> {
        let entry = self.define(target, &units.main, script_id)?;
        let mut sub_units = BTreeMap::new();
        for (&function_id, sub) in &units.sub_units {
            let handle = self.define(target, &sub.unit, script_id)?;
            sub_units.insert(
                function_id,
                InstalledSubUnit {
                    handle,
                    initializer: sub.initializer.clone(),
                },
            );
        }
        Ok(InstalledUnits { entry, sub_units })
    }
}

/// Installs a single anonymous unit against an origin's anchor.
#[derive(Debug)]
pub struct IsolatedInstaller {
    anchor: Arc<IsolationAnchor>,
}

impl IsolatedInstaller {
    pub fn new(anchor: Arc<IsolationAnchor>) -> Self {
        Self { anchor }
    }

    pub fn anchor(&self) -> &Arc<IsolationAnchor> {
        &self.anchor
    }

    fn install(
        &self,
        target: &dyn InstallTarget,
        units: &CompiledUnits,
    ) -> Result<InstalledUnits, InstallError> {
        if units.is_multi_unit() {
            return Err(InstallError::RequiresLinking {
                unit: units.main.name.clone(),
            });
        }
        let entry = target.define_isolated(self.anchor.id, &units.main.bytes)?;
        Ok(InstalledUnits {
            entry: CallableHandle::new(
                "",
                entry,
                units.main.code_hash(),
                InstallOwner::Anchor(Arc::clone(&self.anchor)),
            ),
            sub_units: BTreeMap::new(),
        })
    }
}

/// One of the two installation strategies.
#[derive(Debug)]
pub enum Installer {
    Reusable(ReusableInstaller),
    Isolated(IsolatedInstaller),
}

impl Installer {
    /// Verifies (when a verifier is given) and installs every unit.
    ///
    /// All units are verified before any is defined, so a verification
    /// failure leaves the host untouched.
    pub fn install(
        &mut self,
        target: &dyn InstallTarget,
        units: &CompiledUnits,
        script_id: u64,
        verifier: Option<&dyn Verifier>,
    ) -> Result<InstalledUnits, InstallError> {
        if let Some(verifier) = verifier {
            verify_all(verifier, units)?;
        }
        match self {
            Installer::Reusable(installer) => installer.install(target, units, script_id),
            Installer::Isolated(installer) => installer.install(target, units),
        }
    }

    /// Whether units installed together can reference each other.
    pub fn can_link_multiple_units(&self) -> bool {
        matches!(self, Installer::Reusable(_))
    }

    /// Whether the installer must be replaced before the next install.
    pub fn is_exhausted(&self) -> bool {
        match self {
            Installer::Reusable(installer) => installer.is_exhausted(),
            Installer::Isolated(_) => false,
        }
    }
}

fn verify_all(verifier: &dyn Verifier, units: &CompiledUnits) -> Result<(), InstallError> {
    let all = std::iter::once(&units.main).chain(units.sub_units.values().map(|s| &s.unit));
    for unit in all {
        verifier
            .verify(&unit.name, &unit.bytes)
            .map_err(|reason| InstallError::Verification {
                unit: unit.name.clone(),
                reason,
            })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::LocalTarget;
    use kiln_common::{RawSubUnit, UnitInitializer};

    fn single(bytes: &[u8]) -> CompiledUnits {
        CompiledUnits::single(RawUnit::new("main", bytes.to_vec()))
    }

    fn multi() -> CompiledUnits {
        let mut units = single(b"main-code");
        units.sub_units.insert(
            1,
            RawSubUnit {
                unit: RawUnit::new("f", b"f-code".to_vec()),
                initializer: UnitInitializer {
                    function_name: "f".to_string(),
                    arity: 0,
                    flags: 0,
                },
            },
        );
        units
    }

    fn limits(max_uses: u32, max_bytes: usize) -> ReuseLimits {
        ReuseLimits {
            max_uses,
            max_bytes,
        }
    }

    #[test]
    fn usage_is_counted_per_unit() {
        let target = LocalTarget::new();
        let mut installer =
            Installer::Reusable(ReusableInstaller::new(&target, limits(10, 1000)).unwrap());
        installer.install(&target, &multi(), 1, None).unwrap();

        let Installer::Reusable(reusable) = &installer else {
            panic!("expected reusable installer");
        };
        assert_eq!(reusable.usage_count(), 2);
        assert_eq!(reusable.bytes_installed(), 15);
        assert_eq!(target.units_in(reusable.loader_id()), 2);
    }

    #[test]
    fn exhausted_by_use_count() {
        let target = LocalTarget::new();
        let mut installer =
            Installer::Reusable(ReusableInstaller::new(&target, limits(2, 1000)).unwrap());
        installer.install(&target, &single(b"a"), 1, None).unwrap();
        assert!(!installer.is_exhausted());
        installer.install(&target, &single(b"b"), 2, None).unwrap();
        assert!(installer.is_exhausted());
    }

    #[test]
    fn exhausted_by_bytes() {
        let target = LocalTarget::new();
        let mut installer =
            Installer::Reusable(ReusableInstaller::new(&target, limits(100, 8)).unwrap());
        installer.install(&target, &single(b"12345678"), 1, None).unwrap();
        assert!(installer.is_exhausted());
    }

    #[test]
    fn script_id_qualifies_unit_names() {
        let target = LocalTarget::new();
        let mut installer =
            Installer::Reusable(ReusableInstaller::new(&target, limits(10, 1000)).unwrap());
        let first = installer.install(&target, &single(b"x"), 1, None).unwrap();
        let second = installer.install(&target, &single(b"x"), 2, None).unwrap();
        assert_eq!(first.entry.name(), "main$1");
        assert_eq!(second.entry.name(), "main$2");
        assert_eq!(first.entry.code_hash(), second.entry.code_hash());
    }

    #[test]
    fn isolated_refuses_multi_unit() {
        let target = LocalTarget::new();
        let origin = Origin::new("file:a.js");
        let anchor = Arc::new(IsolationAnchor::new(
            target.create_anchor(&origin).unwrap(),
            origin,
        ));
        let mut installer = Installer::Isolated(IsolatedInstaller::new(anchor));
        assert!(!installer.can_link_multiple_units());

        let err = installer.install(&target, &multi(), 1, None).unwrap_err();
        assert!(matches!(err, InstallError::RequiresLinking { .. }));
        assert_eq!(target.isolated_unit_count(), 0);
    }

    #[test]
    fn isolated_installs_single_unit() {
        let target = LocalTarget::new();
        let origin = Origin::new("file:a.js");
        let anchor = Arc::new(IsolationAnchor::new(
            target.create_anchor(&origin).unwrap(),
            origin,
        ));
        let mut installer = Installer::Isolated(IsolatedInstaller::new(Arc::clone(&anchor)));
        let installed = installer.install(&target, &single(b"x"), 1, None).unwrap();
        assert!(installed.entry.is_isolated());
        assert_eq!(installed.entry.anchor_id(), Some(anchor.id()));
        assert!(!installer.is_exhausted());
    }

    #[test]
    fn verification_failure_defines_nothing() {
        let target = LocalTarget::new();
        let reusable = ReusableInstaller::new(&target, limits(10, 1000)).unwrap();
        let loader = reusable.loader_id();
        let mut installer = Installer::Reusable(reusable);
        let reject_f = |name: &str, _: &[u8]| {
            if name == "f" {
                Err("bad stack map".to_string())
            } else {
                Ok(())
            }
        };

        let err = installer
            .install(&target, &multi(), 1, Some(&reject_f))
            .unwrap_err();
        assert!(matches!(err, InstallError::Verification { ref unit, .. } if unit == "f"));
        assert_eq!(target.units_in(loader), 0);
    }
}
