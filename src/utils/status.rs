//! Aggregated diagnostics for one refactoring attempt.

use crate::utils::location::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a status entry, ordered from harmless to blocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Informational
    Ok,
    /// Advisory; the refactoring may still proceed
    Warning,
    /// A legality violation; the refactoring is refused
    Error,
    /// The request itself cannot be processed
    FatalError,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Ok => write!(f, "ok"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::FatalError => write!(f, "fatal error"),
        }
    }
}

/// A single status message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub severity: Severity,
    pub message: String,
    pub span: Option<Span>,
}

impl fmt::Display for StatusEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span {
            Some(span) if !span.is_dummy() => {
                write!(f, "{}: {} (at {})", self.severity, self.message, span)
            }
            _ => write!(f, "{}: {}", self.severity, self.message),
        }
    }
}

/// Ordered list of severity-tagged messages.
///
/// Checks only ever append; the caller inspects [`RefactoringStatus::severity`]
/// once every check has run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefactoringStatus {
    entries: Vec<StatusEntry>,
}

impl RefactoringStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, severity: Severity, message: impl Into<String>, span: Option<Span>) {
        self.entries.push(StatusEntry { severity, message: message.into(), span });
    }

    pub fn add_info(&mut self, message: impl Into<String>) {
        self.add(Severity::Ok, message, None);
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.add(Severity::Warning, message, None);
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.add(Severity::Error, message, None);
    }

    pub fn add_fatal_error(&mut self, message: impl Into<String>) {
        self.add(Severity::FatalError, message, None);
    }

    /// Add a fatal error pointing at a source span.
    pub fn add_fatal_error_at(&mut self, message: impl Into<String>, span: Span) {
        self.add(Severity::FatalError, message, Some(span));
    }

    /// Append all entries of another status.
    pub fn merge(&mut self, other: RefactoringStatus) {
        self.entries.extend(other.entries);
    }

    /// The most severe entry's severity, `Ok` when empty.
    pub fn severity(&self) -> Severity {
        self.entries
            .iter()
            .map(|e| e.severity)
            .max()
            .unwrap_or(Severity::Ok)
    }

    pub fn has_warning(&self) -> bool {
        self.severity() >= Severity::Warning
    }

    pub fn has_error(&self) -> bool {
        self.severity() >= Severity::Error
    }

    pub fn has_fatal_error(&self) -> bool {
        self.severity() == Severity::FatalError
    }

    pub fn is_ok(&self) -> bool {
        self.severity() == Severity::Ok
    }

    pub fn entries(&self) -> &[StatusEntry] {
        &self.entries
    }

    /// Messages at exactly the given severity.
    pub fn messages(&self, severity: Severity) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.severity == severity)
            .map(|e| e.message.as_str())
            .collect()
    }

    /// True when any entry's message contains `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        self.entries.iter().any(|e| e.message.contains(needle))
    }
}

impl fmt::Display for RefactoringStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return write!(f, "ok");
        }
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", entry)?;
        }
        Ok(())
    }
}
