//! Error types for compilation and installation.

use crate::target::LoaderId;
use kiln_diagnostics::Diagnostic;
use thiserror::Error;

/// Why the host could not make a unit callable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InstallError {
    #[error("isolated installation is not available in this host")]
    IsolationUnavailable,

    #[error("unit `{unit}` links other units and cannot be installed in isolation")]
    RequiresLinking { unit: String },

    #[error("unit `{name}` is already defined in loader {loader}")]
    DuplicateUnit { loader: LoaderId, name: String },

    #[error("verification of unit `{unit}` failed: {reason}")]
    Verification { unit: String, reason: String },

    #[error("host rejected unit `{unit}`: {reason}")]
    Rejected { unit: String, reason: String },
}

/// Why [`ExecutionContext::compile`](crate::ExecutionContext::compile) failed.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The code generator reported errors; they are also left in the sink.
    #[error("compilation failed with {} error(s)", count_errors(.0))]
    Diagnostics(Vec<Diagnostic>),

    /// Generated code could not be installed.
    #[error("installation failed: {0}")]
    Installation(#[from] InstallError),
}

impl CompileError {
    /// Diagnostics attached to the failure, if any.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            CompileError::Diagnostics(diags) => diags,
            CompileError::Installation(_) => &[],
        }
    }
}

fn count_errors(diags: &[Diagnostic]) -> usize {
    diags.iter().filter(|d| d.severity.is_error()).count()
}
