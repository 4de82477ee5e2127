//! # Diagnostics Sink
//!
//! Accumulates errors and warnings found while lowering a program. Passes only
//! ever append; the backend driver reads the error count at its checkpoints
//! and stops before the next stage when it is non-zero.

use std::fmt;

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Blocks the next stage
    Error,
    /// Reported but never blocks
    Warning,
}

/// Diagnostic category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Construct cannot be expressed on the target
    Unsupported,
    /// Construct is malformed for the target
    Invalid,
    /// A required construct is missing
    Expected,
    /// A target limit is exceeded
    Overlimit,
    /// Type mismatch or dangling reference
    Type,
    /// A referenced declaration does not exist
    NotFound,
    /// Two declarations clash
    Duplicate,
    /// Program does not fit the architecture model
    Model,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::Invalid => "invalid",
            ErrorKind::Expected => "expected",
            ErrorKind::Overlimit => "overlimit",
            ErrorKind::Type => "type",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Duplicate => "duplicate",
            ErrorKind::Model => "model",
        };
        f.write_str(name)
    }
}

/// A single diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity
    pub severity: Severity,
    /// Category
    pub kind: ErrorKind,
    /// Pass that reported it
    pub pass: &'static str,
    /// Human-readable message
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{} [{}] {}: {}", level, self.kind, self.pass, self.message)
    }
}

/// The diagnostics sink for one compilation
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
    current_pass: &'static str,
}

impl Diagnostics {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Attribute following reports to `pass`
    pub(crate) fn enter_pass(&mut self, pass: &'static str) {
        self.current_pass = pass;
    }

    /// Record an error
    pub fn error(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.push(Severity::Error, kind, message.into());
    }

    /// Record a warning
    pub fn warning(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.push(Severity::Warning, kind, message.into());
    }

    fn push(&mut self, severity: Severity, kind: ErrorKind, message: String) {
        match severity {
            Severity::Error => tracing::debug!(pass = self.current_pass, %kind, "{}", message),
            Severity::Warning => tracing::warn!(pass = self.current_pass, %kind, "{}", message),
        }
        self.items.push(Diagnostic {
            severity,
            kind,
            pass: self.current_pass,
            message,
        });
    }

    /// Number of errors recorded so far
    pub fn error_count(&self) -> usize {
        self.items
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    /// Number of warnings recorded so far
    pub fn warning_count(&self) -> usize {
        self.items
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }

    /// Whether any error has been recorded
    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    /// All diagnostics in report order
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// Errors only
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(|d| d.severity == Severity::Error)
    }

    /// Clear everything; only valid between independent compilations
    pub fn reset(&mut self) {
        self.items.clear();
        self.current_pass = "";
    }

    /// Take the accumulated diagnostics
    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}
