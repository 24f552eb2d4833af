//! External collaborators the context compiles and verifies through.

use kiln_common::CompiledUnits;
use kiln_diagnostics::DiagnosticSink;
use kiln_source::Source;

/// Parses, analyzes and generates code for a source.
///
/// Returns `None` when generation failed; the reasons are reported to
/// `sink`. Implementations must be safe to call from any thread, though the
/// context never calls them concurrently.
pub trait Codegen: Send + Sync {
    fn compile_units(
        &self,
        source: &Source,
        strict: bool,
        sink: &DiagnosticSink,
    ) -> Option<CompiledUnits>;
}

impl<F> Codegen for F
where
    F: Fn(&Source, bool, &DiagnosticSink) -> Option<CompiledUnits> + Send + Sync,
{
    fn compile_units(
        &self,
        source: &Source,
        strict: bool,
        sink: &DiagnosticSink,
    ) -> Option<CompiledUnits> {
        self(source, strict, sink)
    }
}

/// Checks generated code before it is installed.
pub trait Verifier: Send + Sync {
    /// Returns the reason `code` is malformed, if it is.
    fn verify(&self, unit_name: &str, code: &[u8]) -> Result<(), String>;
}

impl<F> Verifier for F
where
    F: Fn(&str, &[u8]) -> Result<(), String> + Send + Sync,
{
    fn verify(&self, unit_name: &str, code: &[u8]) -> Result<(), String> {
        self(unit_name, code)
    }
}
