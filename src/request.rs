//! Refactoring requests: which loop, which transformation, which
//! parameters.

use crate::context::RefactoringContext;
use crate::frontend::ast::Stmt;
use crate::transform::{self, Fusion, Interchange, ParallelKind, Parallelize, Refactoring, StripMining, Tiling, Unrolling};
use crate::utils::errors::LoopForgeError;
use crate::utils::status::RefactoringStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A transformation and its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefactoringKind {
    Interchange { depth: usize },
    Fuse,
    Unroll { factor: i64 },
    StripMine { factor: i64, depth: usize },
    Tile { factor: i64, depth: usize },
    Parallelize(ParallelKind),
}

impl fmt::Display for RefactoringKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefactoringKind::Interchange { depth } => write!(f, "interchange (depth {})", depth),
            RefactoringKind::Fuse => write!(f, "fuse"),
            RefactoringKind::Unroll { factor } => write!(f, "unroll (factor {})", factor),
            RefactoringKind::StripMine { factor, depth } => {
                write!(f, "strip-mine (factor {}, depth {})", factor, depth)
            }
            RefactoringKind::Tile { factor, depth } => write!(f, "tile (factor {}, depth {})", factor, depth),
            RefactoringKind::Parallelize(kind) => write!(f, "{} loop", kind),
        }
    }
}

/// One refactoring request against the loop starting on `line`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefactoringRequest {
    /// 1-based line of the selected `for` statement
    pub line: usize,
    pub kind: RefactoringKind,
}

/// The status of a request and, when it was carried out, the new source.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub status: RefactoringStatus,
    pub source: Option<String>,
}

impl RefactoringRequest {
    pub fn new(line: usize, kind: RefactoringKind) -> Self {
        Self { line, kind }
    }

    /// Build the refactoring for `target`.
    pub fn refactoring<'a>(&self, target: &'a Stmt) -> Box<dyn Refactoring<'a> + 'a> {
        match self.kind {
            RefactoringKind::Interchange { depth } => Box::new(Interchange::new(target, depth)),
            RefactoringKind::Fuse => Box::new(Fusion::new(target)),
            RefactoringKind::Unroll { factor } => Box::new(Unrolling::new(target, factor)),
            RefactoringKind::StripMine { factor, depth } => Box::new(StripMining::new(target, factor, depth)),
            RefactoringKind::Tile { factor, depth } => Box::new(Tiling::new(target, factor, depth)),
            RefactoringKind::Parallelize(kind) => Box::new(Parallelize::new(target, kind)),
        }
    }

    fn target<'a>(&self, ctx: &RefactoringContext<'a>) -> Result<&'a Stmt, LoopForgeError> {
        ctx.loop_at_line(self.line).ok_or(LoopForgeError::NoLoop(self.line))
    }

    /// Run every check for this request.
    pub fn check(&self, ctx: &RefactoringContext<'_>) -> Result<RefactoringStatus, LoopForgeError> {
        let target = self.target(ctx)?;
        Ok(transform::check(self.refactoring(target).as_ref(), ctx))
    }

    /// Check the request and, unless `check_only` is set or the checks
    /// found an error, rewrite the source.
    pub fn run(&self, ctx: &RefactoringContext<'_>, check_only: bool) -> Result<RequestOutcome, LoopForgeError> {
        let target = self.target(ctx)?;
        let refactoring = self.refactoring(target);
        log::info!("{} at line {}", self.kind, self.line);

        let status = transform::check(refactoring.as_ref(), ctx);
        if check_only || status.has_error() {
            return Ok(RequestOutcome { status, source: None });
        }
        let outcome = transform::execute(refactoring.as_ref(), ctx, status)?;
        let source = outcome.apply(ctx.source().source())?;
        Ok(RequestOutcome { status: outcome.status, source: Some(source) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parse;

    const SOURCE: &str = "void f(int a[16]) {\n  for (int i = 0; i < 16; i++)\n    a[i] = 2 * a[i];\n}\n";

    #[test]
    fn test_run_rewrites_source() {
        let unit = parse(SOURCE).unwrap();
        let ctx = RefactoringContext::new(&unit);
        let request = RefactoringRequest::new(2, RefactoringKind::Parallelize(ParallelKind::Kernels));
        let outcome = request.run(&ctx, false).unwrap();
        assert!(outcome.source.unwrap().contains("  #pragma acc kernels loop\n  for (int i"));
    }

    #[test]
    fn test_check_only_and_refusal_keep_source() {
        let unit = parse(SOURCE).unwrap();
        let ctx = RefactoringContext::new(&unit);
        let outcome = RefactoringRequest::new(2, RefactoringKind::Unroll { factor: 4 }).run(&ctx, true).unwrap();
        assert!(!outcome.status.has_error());
        assert!(outcome.source.is_none());

        let outcome = RefactoringRequest::new(2, RefactoringKind::Unroll { factor: 0 }).run(&ctx, false).unwrap();
        assert!(outcome.status.has_fatal_error());
        assert!(outcome.source.is_none());
    }

    #[test]
    fn test_missing_loop() {
        let unit = parse(SOURCE).unwrap();
        let ctx = RefactoringContext::new(&unit);
        let err = RefactoringRequest::new(3, RefactoringKind::Fuse).check(&ctx).unwrap_err();
        assert!(matches!(err, LoopForgeError::NoLoop(3)));
    }
}
