//! Compilation caching and code installation for the kiln script runtime.
//!
//! An [`ExecutionContext`] turns [`Source`](kiln_source::Source)s into
//! [`CompiledArtifact`]s at most once per distinct fingerprint. It probes the
//! in-memory cache, then the persistent store, and only on a full miss asks
//! the external [`Codegen`] for raw units. Raw units become callable through
//! an [`Installer`]: either a [`ReusableInstaller`] that shares one loader
//! across compiles until it is worn out, or an [`IsolatedInstaller`] that
//! installs a single unit against a per-origin anchor.
//!
//! The context also owns the [`GlobalConstants`] optimizer, which folds
//! global bindings only while a single [`Scope`] exists.

pub mod anchors;
pub mod artifact;
pub mod collaborator;
pub mod context;
pub mod error;
pub mod global_constants;
pub mod guard;
pub mod installer;
pub mod scope;
pub mod target;

#[cfg(test)]
mod testing;

pub use anchors::AnchorCache;
pub use artifact::{CallableHandle, CompiledArtifact, InstallOwner, InstalledSubUnit};
pub use collaborator::{Codegen, Verifier};
pub use context::{Collaborators, ContextStats, ExecutionContext};
pub use error::{CompileError, InstallError};
pub use global_constants::{GlobalConstants, OptimizerState};
pub use guard::{Guard, GuardRegistry};
pub use installer::{
    InstalledUnits, Installer, IsolatedInstaller, IsolationAnchor, Loader, ReusableInstaller,
    ReuseLimits,
};
pub use scope::{current_scope, enter_scope, set_current_scope, Scope, ScopeEntered, ScopeId};
pub use target::{AnchorId, EntryPoint, InstallTarget, LoaderId, LocalTarget};
