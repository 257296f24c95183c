//! Error types for the loop refactoring engine.
//!
//! Errors are organized by the phase that produces them. Parse-shape
//! failures and analysis failures are ordinary values here; the legality
//! rules turn them into [`RefactoringStatus`](crate::utils::status::RefactoringStatus)
//! entries instead of assuming a transformation is safe.

use crate::utils::location::Span;
use std::fmt;
use thiserror::Error;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum LoopForgeError {
    /// Error during lexing/tokenization
    #[error("Lexer error: {0}")]
    Lexer(#[from] LexerError),

    /// Error during parsing
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// An expression outside the affine subscript grammar
    #[error("Affine parse error: {0}")]
    Affine(#[from] AffineParseError),

    /// Dependence testing could not complete
    #[error("Dependence analysis error: {0}")]
    Dependence(#[from] DependenceTestFailure),

    /// The rewrite layer rejected an edit
    #[error("Rewrite error: {0}")]
    Rewrite(#[from] RewriteError),

    /// A refactoring was refused by its checks
    #[error("Refactoring refused: {0}")]
    Refused(String),

    /// No `for` statement where the request points
    #[error("No for loop starts on line {0}")]
    NoLoop(usize),

    /// The request was cancelled
    #[error("Refactoring cancelled")]
    Cancelled,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error during lexical analysis.
#[derive(Error, Debug, Clone)]
pub struct LexerError {
    /// The error message
    pub message: String,
    /// Location in source
    pub span: Span,
    /// The kind of lexer error
    pub kind: LexerErrorKind,
}

impl fmt::Display for LexerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.span)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexerErrorKind {
    /// Unexpected character
    UnexpectedChar,
    /// Unterminated string or character literal
    UnterminatedLiteral,
    /// Invalid number literal
    InvalidNumber,
    /// Unterminated block comment
    UnterminatedComment,
}

/// Error during parsing.
#[derive(Error, Debug, Clone)]
pub struct ParseError {
    /// The error message
    pub message: String,
    /// Location in source
    pub span: Span,
    /// What was found
    pub found: Option<String>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.span)?;
        if let Some(ref found) = self.found {
            write!(f, " (found: {})", found)?;
        }
        Ok(())
    }
}

/// An expression shape outside the affine grammar `c + Σ a·v`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct AffineParseError {
    /// What went wrong
    pub message: String,
    /// Raw text of the offending subtree
    pub text: String,
    /// Line of the offending subtree
    pub line: usize,
}

impl AffineParseError {
    pub fn new(message: impl Into<String>, text: impl Into<String>, line: usize) -> Self {
        Self { message: message.into(), text: text.into(), line }
    }
}

impl fmt::Display for AffineParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: '{}' (line {})", self.message, self.text, self.line)
    }
}

/// Dependence testing could not be completed.
///
/// Callers report this as "dependences could not be analyzed"; it never
/// means the code is dependence-free.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct DependenceTestFailure {
    /// Human-readable cause
    pub cause: String,
    /// The kind of failure
    pub kind: DependenceFailureKind,
}

impl DependenceTestFailure {
    pub fn new(kind: DependenceFailureKind, cause: impl Into<String>) -> Self {
        Self { cause: cause.into(), kind }
    }
}

impl fmt::Display for DependenceTestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cause)
    }
}

impl From<AffineParseError> for DependenceTestFailure {
    fn from(err: AffineParseError) -> Self {
        Self::new(DependenceFailureKind::NonAffineSubscript, err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependenceFailureKind {
    /// A for-loop sits next to other statements at one nest level
    ImperfectNest,
    /// Loop header outside the supported initializer/condition shapes
    UnsupportedLoopHeader,
    /// Subscript outside the affine grammar
    NonAffineSubscript,
    /// Loop body contains break/continue/goto/return
    UnsupportedControlFlow,
    /// Constraint system grew past the configured limit or overflowed
    ComplexityLimit,
    /// Cancellation was requested
    Cancelled,
}

/// The rewrite layer rejected an edit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RewriteError {
    /// Two edits touch the same bytes
    #[error("edit at offset {offset} (length {length}) overlaps an existing edit")]
    Overlap { offset: usize, length: usize },
    /// Edit extends past the end of the buffer
    #[error("edit at offset {offset} (length {length}) is outside the source buffer")]
    OutOfBounds { offset: usize, length: usize },
}

/// Result type using LoopForgeError.
pub type LoopForgeResult<T> = Result<T, LoopForgeError>;
