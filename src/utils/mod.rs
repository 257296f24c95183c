//! Utility modules shared across the crate.
//!
//! This module contains common utilities used throughout the codebase:
//! - Error types
//! - Source location tracking
//! - Refactoring status reports
//! - Text edits against the source buffer
//! - Cooperative cancellation

pub mod errors;
pub mod location;
pub mod status;
pub mod rewrite;
pub mod cancel;

// Re-exports
pub use errors::*;
pub use location::{SourceLocation, SourceMap, Span};
pub use status::{RefactoringStatus, Severity, StatusEntry};
pub use rewrite::{SourceEdits, TextEdit};
pub use cancel::CancellationToken;
