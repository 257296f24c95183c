//! # LoopForge - Dependence-Checked Loop Refactorings for C
//!
//! A loop-nest analysis and transformation engine, including:
//! - Loop nest inspection (counted loops, perfect nesting, bounds, steps)
//! - Affine subscript modelling and dependence analysis (GCD test,
//!   Fourier-Motzkin elimination, direction vectors)
//! - Legality checks and source rewrites for interchange, fusion,
//!   unrolling, strip-mining, tiling and OpenACC parallel/kernels loops
//!
//! ## Architecture
//!
//! ```text
//! Source → Frontend (AST, bindings) → Analysis (loops, dependences) → Transform (status, edits) → Source
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use loopforge::prelude::*;
//!
//! let source = r#"
//!     void scale(double a[100]) {
//!         for (int i = 0; i < 100; i++)
//!             a[i] = a[i] * 2;
//!     }
//! "#;
//!
//! let unit = loopforge::parse(source)?;
//! let ctx = RefactoringContext::new(&unit);
//! let request = RefactoringRequest::new(3, RefactoringKind::Parallelize(ParallelKind::Parallel));
//! let outcome = request.run(&ctx, false)?;
//! println!("{}", outcome.status);
//! ```

#![warn(clippy::all)]

pub mod frontend;
pub mod polyhedral;
pub mod analysis;
pub mod transform;
pub mod context;
pub mod request;
pub mod utils;

// Re-export commonly used types
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::frontend::{parse, ParseError, TranslationUnit, Stmt, Expr};
    pub use crate::analysis::{
        AffineExpr, ConstantOracle, Dependence, DependenceAnalysis, DependenceKind, Direction,
        InductionVariable, LoopInspector,
    };
    pub use crate::polyhedral::{Constraint, ConstraintSystem, FourierMotzkin};
    pub use crate::context::{AnalysisConfig, RefactoringContext};
    pub use crate::request::{RefactoringKind, RefactoringRequest, RequestOutcome};
    pub use crate::transform::{
        check, perform, Fusion, Interchange, Outcome, ParallelKind, Parallelize, Refactoring, StripMining,
        Tiling, Unrolling,
    };
    pub use crate::utils::errors::*;
    pub use crate::utils::{CancellationToken, RefactoringStatus, Severity, SourceEdits};
}

use anyhow::{Context, Result};

/// Main entry point for parsing source code.
pub fn parse(source: &str) -> Result<frontend::TranslationUnit> {
    frontend::parse(source)
}

/// Parse `source` and run one request against it.
pub fn refactor(source: &str, request: &request::RefactoringRequest, check_only: bool) -> Result<request::RequestOutcome> {
    let unit = parse(source)?;
    let ctx = context::RefactoringContext::new(&unit);
    request
        .run(&ctx, check_only)
        .with_context(|| format!("{} at line {} failed", request.kind, request.line))
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_refactor_end_to_end() {
        let source = "void f(int a[8]) {\n  for (int i = 0; i < 8; i++)\n    a[i] = 0;\n}\n";
        let request = request::RefactoringRequest::new(2, request::RefactoringKind::Unroll { factor: 8 });
        let outcome = refactor(source, &request, false).unwrap();
        let rewritten = outcome.source.unwrap();
        assert!(rewritten.contains("a[(i + 7)] = 0;"));
        assert!(!rewritten.contains("i++"));
    }
}
