//! Structured diagnostic messages with severity, code, and location.

use crate::code::DiagnosticCode;
use crate::severity::Severity;
use kiln_source::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A structured diagnostic message.
///
/// Produced by the parser/code generator collaborator and returned to the
/// embedder inside a compile error. The source name is recorded so that a
/// diagnostic stays meaningful once detached from its compile request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity level of this diagnostic.
    pub severity: Severity,
    /// The code identifying the kind of diagnostic.
    pub code: DiagnosticCode,
    /// The main diagnostic message.
    pub message: String,
    /// Name of the source the diagnostic refers to.
    pub source_name: String,
    /// Where in the source the issue was detected.
    pub span: Span,
    /// Explanatory footnotes.
    pub notes: Vec<String>,
}

impl Diagnostic {
    /// Creates an error diagnostic.
    pub fn error(
        code: DiagnosticCode,
        message: impl Into<String>,
        source_name: impl Into<String>,
        span: Span,
    ) -> Self {
        Self::with_severity(Severity::Error, code, message, source_name, span)
    }

    /// Creates a warning diagnostic.
    pub fn warning(
        code: DiagnosticCode,
        message: impl Into<String>,
        source_name: impl Into<String>,
        span: Span,
    ) -> Self {
        Self::with_severity(Severity::Warning, code, message, source_name, span)
    }

    fn with_severity(
        severity: Severity,
        code: DiagnosticCode,
        message: impl Into<String>,
        source_name: impl Into<String>,
        span: Span,
    ) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            source_name: source_name.into(),
            span,
            notes: Vec::new(),
        }
    }

    /// Adds a note to this diagnostic.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]: {}", self.severity, self.code, self.message)?;
        if !self.span.is_dummy() {
            write!(f, " ({}:{})", self.source_name, self.span.start)?;
        } else if !self.source_name.is_empty() {
            write!(f, " ({})", self.source_name)?;
        }
        Ok(())
    }
}
