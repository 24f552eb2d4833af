//! Test doubles shared by the unit tests.

use crate::collaborator::Codegen;
use crate::context::{Collaborators, ExecutionContext};
use crate::error::InstallError;
use crate::target::{AnchorId, EntryPoint, InstallTarget, LoaderId, LocalTarget};
use kiln_common::{CompiledUnits, Constant, RawSubUnit, RawUnit, UnitInitializer};
use kiln_config::RuntimeConfig;
use kiln_diagnostics::{Category, Diagnostic, DiagnosticCode, DiagnosticSink};
use kiln_source::{Origin, Source, Span};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Generates one unit per source plus one per `function` keyword, and
/// reports a syntax error for sources containing `@@`.
#[derive(Default)]
pub(crate) struct CountingCodegen {
    calls: AtomicUsize,
}

impl CountingCodegen {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Codegen for CountingCodegen {
    fn compile_units(
        &self,
        source: &Source,
        _strict: bool,
        sink: &DiagnosticSink,
    ) -> Option<CompiledUnits> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(at) = source.text().find("@@") {
            let at = at as u32;
            let first = Span::new(at, at + 1);
            sink.emit(
                Diagnostic::error(
                    DiagnosticCode::new(Category::Syntax, 1),
                    "unexpected token `@`",
                    source.name(),
                    first.merge(Span::new(at + 1, at + 2)),
                )
                .with_note("`@` is only valid inside decorators"),
            );
            return None;
        }
        let mut units = CompiledUnits::single(RawUnit::new(
            "program",
            source.text().as_bytes().to_vec(),
        ));
        for (function_id, (offset, _)) in source.text().match_indices("function").enumerate() {
            units.sub_units.insert(
                function_id as u32 + 1,
                RawSubUnit {
                    unit: RawUnit::new(format!("fn{offset}"), offset.to_le_bytes().to_vec()),
                    initializer: UnitInitializer {
                        function_name: format!("fn{offset}"),
                        arity: 0,
                        flags: 0,
                    },
                },
            );
        }
        units
            .constants
            .push(Constant::Number(source.len() as f64));
        Some(units)
    }
}

/// Claims isolation support but rejects every isolated definition.
#[derive(Default)]
pub(crate) struct BrokenIsolationTarget {
    pub(crate) inner: LocalTarget,
}

impl InstallTarget for BrokenIsolationTarget {
    fn create_loader(&self) -> Result<LoaderId, InstallError> {
        self.inner.create_loader()
    }

    fn isolation_available(&self) -> bool {
        true
    }

    fn create_anchor(&self, origin: &Origin) -> Result<AnchorId, InstallError> {
        self.inner.create_anchor(origin)
    }

    fn define_named(
        &self,
        loader: LoaderId,
        name: &str,
        code: &[u8],
    ) -> Result<EntryPoint, InstallError> {
        self.inner.define_named(loader, name, code)
    }

    fn define_isolated(&self, _anchor: AnchorId, _code: &[u8]) -> Result<EntryPoint, InstallError> {
        Err(InstallError::IsolationUnavailable)
    }
}

pub(crate) struct Harness {
    pub(crate) context: Arc<ExecutionContext>,
    pub(crate) codegen: Arc<CountingCodegen>,
    pub(crate) target: Arc<LocalTarget>,
}

pub(crate) fn harness(config: RuntimeConfig) -> Harness {
    let codegen = Arc::new(CountingCodegen::default());
    let target = Arc::new(LocalTarget::new());
    let context = Arc::new(ExecutionContext::new(
        config,
        Collaborators::new(codegen.clone(), target.clone()),
    ));
    Harness {
        context,
        codegen,
        target,
    }
}

pub(crate) fn context(config: RuntimeConfig) -> Arc<ExecutionContext> {
    harness(config).context
}
