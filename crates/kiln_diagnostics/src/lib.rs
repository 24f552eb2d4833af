//! Diagnostics reported by the parser and code generator.
//!
//! Structured [`Diagnostic`] messages carry a severity, a code and a source
//! span. The thread-safe [`DiagnosticSink`] accumulates them during one
//! compilation; a non-empty error count aborts the compile.

#![warn(missing_docs)]

pub mod code;
pub mod diagnostic;
pub mod severity;
pub mod sink;

pub use code::{Category, DiagnosticCode};
pub use diagnostic::Diagnostic;
pub use severity::Severity;
pub use sink::DiagnosticSink;
