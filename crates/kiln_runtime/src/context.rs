//! The execution context: compile caching, installer selection and
//! context-wide optimizer state.

use crate::anchors::AnchorCache;
use crate::artifact::CompiledArtifact;
use crate::collaborator::{Codegen, Verifier};
use crate::error::{CompileError, InstallError};
use crate::global_constants::GlobalConstants;
use crate::guard::{Guard, GuardRegistry};
use crate::installer::{
    InstalledUnits, Installer, IsolatedInstaller, ReusableInstaller, ReuseLimits,
};
use crate::scope::{Scope, ScopeId};
use crate::target::InstallTarget;
use kiln_cache::{CacheKey, MemoryCache, OptimizationProfile, PersistentStore};
use kiln_common::{CompiledUnits, RUNTIME_VERSION};
use kiln_config::RuntimeConfig;
use kiln_diagnostics::DiagnosticSink;
use kiln_source::{Source, SourceFingerprint};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// The external services a context compiles through.
#[derive(Clone)]
pub struct Collaborators {
    pub codegen: Arc<dyn Codegen>,
    pub target: Arc<dyn InstallTarget>,
    /// Consulted only when `compile.verify_code` is set.
    pub verifier: Option<Arc<dyn Verifier>>,
}

impl Collaborators {
    pub fn new(codegen: Arc<dyn Codegen>, target: Arc<dyn InstallTarget>) -> Self {
        Self {
            codegen,
            target,
            verifier: None,
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }
}

/// Counters describing what a context's compiles did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContextStats {
    pub memory_hits: u64,
    pub persistent_hits: u64,
    pub fresh_compiles: u64,
    pub failed_compiles: u64,
    /// Units defined by name through reusable installers.
    pub named_units: u64,
    /// Units defined through isolated installers.
    pub isolated_units: u64,
    pub installer_rotations: u64,
    pub persist_failures: u64,
}

struct CompileState {
    memory: Option<MemoryCache<SourceFingerprint, CompiledArtifact>>,
    store: Option<PersistentStore>,
    reusable: Option<ReusableInstaller>,
    anchors: AnchorCache,
    stats: ContextStats,
}

/// Owns everything shared by the scopes of one embedding.
///
/// Compiles are serialized: at most one compile runs per context at a time,
/// so the code generator is never called twice for the same fingerprint by
/// concurrent callers. The compilation and script id counters are atomic and
/// can be read without taking the compile lock.
pub struct ExecutionContext {
    config: RuntimeConfig,
    runtime_version: String,
    collaborators: Collaborators,
    state: Mutex<CompileState>,
    compilation_ids: AtomicU64,
    script_ids: AtomicU64,
    scope_ids: AtomicU64,
    isolation_failed: AtomicBool,
    guards: GuardRegistry,
    global_constants: OnceLock<Arc<GlobalConstants>>,
}

impl ExecutionContext {
    /// Creates a context for the running runtime version.
    pub fn new(config: RuntimeConfig, collaborators: Collaborators) -> Self {
        Self::with_runtime_version(config, collaborators, RUNTIME_VERSION)
    }

    /// Creates a context whose persisted records are tagged with
    /// `runtime_version` instead of the crate version.
    pub fn with_runtime_version(
        config: RuntimeConfig,
        collaborators: Collaborators,
        runtime_version: &str,
    ) -> Self {
        let memory = (config.cache.memory_capacity > 0)
            .then(|| MemoryCache::new(config.cache.memory_capacity));
        let store = if config.persistence_enabled() {
            open_store(&config, runtime_version)
        } else {
            None
        };
        debug!(
            runtime_version,
            memory_capacity = config.cache.memory_capacity,
            persistent = store.is_some(),
            "created execution context"
        );

        Self {
            config,
            runtime_version: runtime_version.to_string(),
            collaborators,
            state: Mutex::new(CompileState {
                memory,
                store,
                reusable: None,
                anchors: AnchorCache::new(),
                stats: ContextStats::default(),
            }),
            compilation_ids: AtomicU64::new(0),
            script_ids: AtomicU64::new(0),
            scope_ids: AtomicU64::new(0),
            isolation_failed: AtomicBool::new(false),
            guards: GuardRegistry::new(),
            global_constants: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn runtime_version(&self) -> &str {
        &self.runtime_version
    }

    /// Compiles `source`, reusing a cached result when one exists.
    ///
    /// Lookup order is the in-memory cache, then the persistent store, then
    /// the code generator. Diagnostics from the generator are left in `sink`
    /// (which is reset first) and also returned in the error.
    pub fn compile(
        &self,
        source: &Source,
        sink: &DiagnosticSink,
    ) -> Result<Arc<CompiledArtifact>, CompileError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        sink.reset();

        let strict = self.config.compile.strict || source.is_strict();
        let fingerprint = source.fingerprint().with_strict(strict);

        if let Some(artifact) = state.memory.as_mut().and_then(|m| m.get(&fingerprint)) {
            state.stats.memory_hits += 1;
            debug!(source = %source, "code cache hit, avoiding recompile");
            return Ok(artifact);
        }

        let key = self.persistence_key(state, &fingerprint);
        let stored = key
            .as_ref()
            .and_then(|key| state.store.as_ref()?.load(&fingerprint, key));

        let (units, stored_id) = match stored {
            Some(record) => {
                state.stats.persistent_hits += 1;
                debug!(
                    source = %source,
                    compilation_id = record.compilation_id,
                    "loaded compiled script from persistent store"
                );
                (record.units, Some(record.compilation_id))
            }
            None => match self.generate(source, strict, sink) {
                Ok(units) => (units, None),
                Err(err) => {
                    state.stats.failed_compiles += 1;
                    return Err(err);
                }
            },
        };

        let installed = match self.install(state, source, &units) {
            Ok(installed) => installed,
            Err(err) => {
                state.stats.failed_compiles += 1;
                return Err(err.into());
            }
        };

        let compilation_id = match stored_id {
            Some(id) => {
                // fresh compiles must never reuse a persisted id
                self.compilation_ids.fetch_max(id + 1, Ordering::SeqCst);
                id
            }
            None => self.compilation_ids.fetch_add(1, Ordering::SeqCst),
        };

        if stored_id.is_none() {
            state.stats.fresh_compiles += 1;
            if let (Some(key), Some(store)) = (&key, &state.store) {
                if let Err(err) = store.store(key, &fingerprint, &units, compilation_id) {
                    state.stats.persist_failures += 1;
                    warn!(source = %source, error = %err, "failed to persist compiled script");
                }
            }
        }

        let artifact = Arc::new(CompiledArtifact::new(
            fingerprint,
            installed,
            &units.constants,
            compilation_id,
        ));
        if let Some(memory) = state.memory.as_mut() {
            memory.put(fingerprint, &artifact);
        }
        Ok(artifact)
    }

    fn generate(
        &self,
        source: &Source,
        strict: bool,
        sink: &DiagnosticSink,
    ) -> Result<CompiledUnits, CompileError> {
        match self.collaborators.codegen.compile_units(source, strict, sink) {
            Some(units) if !sink.has_errors() => {
                debug!(source = %source, units = units.unit_count(), "generated code");
                Ok(units)
            }
            _ => {
                debug!(source = %source, errors = sink.error_count(), "compilation failed");
                Err(CompileError::Diagnostics(sink.diagnostics()))
            }
        }
    }

    fn persistence_key(
        &self,
        state: &CompileState,
        fingerprint: &SourceFingerprint,
    ) -> Option<CacheKey> {
        let store = state.store.as_ref()?;
        let compile = &self.config.compile;
        // eager optimistic code bakes in type assumptions a later run may not share
        if compile.optimistic_types && !compile.lazy {
            return None;
        }
        store
            .is_eligible(fingerprint)
            .then(|| store.cache_key(fingerprint))
    }

    fn install(
        &self,
        state: &mut CompileState,
        source: &Source,
        units: &CompiledUnits,
    ) -> Result<InstalledUnits, InstallError> {
        let target = self.collaborators.target.as_ref();
        let verifier = if self.config.compile.verify_code {
            self.collaborators.verifier.as_deref()
        } else {
            None
        };
        let script_id = self.script_ids.fetch_add(1, Ordering::Relaxed);

        let mut installer = self.select_installer(state, source, units)?;
        let result = installer.install(target, units, script_id, verifier);

        match installer {
            Installer::Reusable(reusable) => match &result {
                Ok(_) => {
                    state.stats.named_units += units.unit_count() as u64;
                    state.reusable = Some(reusable);
                }
                // nothing was defined, so the loader is still clean
                Err(InstallError::Verification { .. }) => state.reusable = Some(reusable),
                Err(err) => {
                    warn!(
                        loader = %reusable.loader_id(),
                        error = %err,
                        "installation failed, discarding loader"
                    );
                }
            },
            Installer::Isolated(_) => match &result {
                Ok(_) => state.stats.isolated_units += 1,
                Err(err) => self.disable_isolation(err),
            },
        }
        result
    }

    fn select_installer(
        &self,
        state: &mut CompileState,
        source: &Source,
        units: &CompiledUnits,
    ) -> Result<Installer, InstallError> {
        if self.may_isolate(state, source) {
            if units.is_multi_unit() {
                debug!(
                    source = %source,
                    units = units.unit_count(),
                    "installing linked units by name"
                );
            } else {
                let target = self.collaborators.target.as_ref();
                match state.anchors.get_or_create(source.origin(), target) {
                    Ok(anchor) => return Ok(Installer::Isolated(IsolatedInstaller::new(anchor))),
                    Err(err) => self.disable_isolation(&err),
                }
            }
        }
        self.take_reusable(state).map(Installer::Reusable)
    }

    fn may_isolate(&self, state: &CompileState, source: &Source) -> bool {
        state.store.is_none()
            && self.config.compile.lazy
            && !self.isolation_failed.load(Ordering::Acquire)
            && self.collaborators.target.isolation_available()
            && self.config.installer.allows_isolation(source.len())
    }

    fn take_reusable(&self, state: &mut CompileState) -> Result<ReusableInstaller, InstallError> {
        match state.reusable.take() {
            Some(installer)
                if !installer.is_exhausted() && !self.config.compile.loader_per_compile =>
            {
                Ok(installer)
            }
            previous => {
                if let Some(old) = previous.as_ref().filter(|old| old.is_exhausted()) {
                    state.stats.installer_rotations += 1;
                    debug!(
                        loader = %old.loader_id(),
                        uses = old.usage_count(),
                        bytes = old.bytes_installed(),
                        "replacing reusable installer"
                    );
                }
                ReusableInstaller::new(
                    self.collaborators.target.as_ref(),
                    ReuseLimits::from(&self.config.installer),
                )
            }
        }
    }

    fn disable_isolation(&self, err: &InstallError) {
        if !self.isolation_failed.swap(true, Ordering::AcqRel) {
            warn!(error = %err, "isolated installation failed, later compiles install by name");
        }
    }

    /// Whether isolated installation has been given up on for this context.
    pub fn isolation_failed(&self) -> bool {
        self.isolation_failed.load(Ordering::Acquire)
    }

    /// The id the next fresh compile will get.
    pub fn next_compilation_id(&self) -> u64 {
        self.compilation_ids.load(Ordering::SeqCst)
    }

    /// Creates a new global scope.
    ///
    /// The first scope creates the global constants optimizer; every later
    /// one disables it for good.
    pub fn create_scope(self: &Arc<Self>) -> Arc<Scope> {
        self.create_or_invalidate_global_constants();
        let id = ScopeId(self.scope_ids.fetch_add(1, Ordering::Relaxed));
        debug!(scope = %id, "created scope");
        Arc::new(Scope::new(id, Arc::clone(self)))
    }

    fn create_or_invalidate_global_constants(&self) {
        loop {
            if let Some(existing) = self.global_constants.get() {
                existing.invalidate_forever();
                return;
            }
            // a racing creator may win the slot; the loop then invalidates it
            if self
                .global_constants
                .set(Arc::new(GlobalConstants::new()))
                .is_ok()
            {
                return;
            }
        }
    }

    /// The global constants optimizer, once a scope exists.
    pub fn global_constants(&self) -> Option<Arc<GlobalConstants>> {
        self.global_constants.get().cloned()
    }

    /// The optimizer if it exists and may still fold.
    pub fn active_global_constants(&self) -> Option<Arc<GlobalConstants>> {
        self.global_constants().filter(|gc| !gc.is_disabled())
    }

    /// The context-wide guard for builtin `name`.
    pub fn guard(&self, name: &str) -> Arc<Guard> {
        self.guards.get_or_create(name)
    }

    pub fn guards(&self) -> &GuardRegistry {
        &self.guards
    }

    pub fn stats(&self) -> ContextStats {
        self.state.lock().stats
    }

    /// Drops every in-memory cache entry; the persistent store is untouched.
    pub fn clear_memory_cache(&self) {
        if let Some(memory) = self.state.lock().memory.as_mut() {
            memory.clear();
        }
    }

    /// Directory of the persistent store, if persistence is active.
    pub fn persistent_store_dir(&self) -> Option<std::path::PathBuf> {
        self.state
            .lock()
            .store
            .as_ref()
            .map(|store| store.dir().to_path_buf())
    }
}

fn open_store(config: &RuntimeConfig, runtime_version: &str) -> Option<PersistentStore> {
    let profile = OptimizationProfile::for_flags(config.compile.optimistic_types);
    let root: &Path = &config.cache.directory;
    match PersistentStore::open(root, runtime_version, profile, config.cache.min_persist_size) {
        Ok(store) => {
            info!(dir = %store.dir().display(), "persistent code store enabled");
            Some(store)
        }
        Err(err) => {
            warn!(
                dir = %root.display(),
                error = %err,
                "cannot open persistent code store, persistence disabled"
            );
            None
        }
    }
}
