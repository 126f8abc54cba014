use std::fmt;

use serde::Serialize;

use crate::syntax::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// One finding, located by byte offsets into the analyzed source. Messages
/// mark names and types with backticks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub from: usize,
    pub to: usize,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn span(&self) -> Span {
        Span::new(self.from, self.to)
    }
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn push_error<S: Into<String>>(&mut self, span: Span, message: S) {
        self.push(span, Severity::Error, message);
    }

    pub fn push_warning<S: Into<String>>(&mut self, span: Span, message: S) {
        self.push(span, Severity::Warning, message);
    }

    fn push<S: Into<String>>(&mut self, span: Span, severity: Severity, message: S) {
        self.entries.push(Diagnostic {
            from: span.from,
            to: span.to,
            severity,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn has_errors(&self) -> bool {
        self.entries
            .iter()
            .any(|diagnostic| diagnostic.severity == Severity::Error)
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}
