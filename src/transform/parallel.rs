//! Introduce an OpenACC parallel or kernels loop.
//!
//! Marks a loop with `#pragma acc parallel loop` or `#pragma acc kernels
//! loop`. A parallel loop asserts that its iterations are independent, so a
//! dependence carried by the loop is an error. With a kernels loop the
//! compiler still checks for itself, so the same finding is only a warning.

use crate::context::RefactoringContext;
use crate::frontend::ast::{Stmt, StmtKind};
use crate::transform::{analyze_or_report, check_no_jumps, insert_lines_before, Refactoring};
use crate::utils::errors::LoopForgeError;
use crate::utils::rewrite::SourceEdits;
use crate::utils::status::RefactoringStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which OpenACC construct to introduce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParallelKind {
    Parallel,
    Kernels,
}

impl ParallelKind {
    pub fn directive(&self) -> &'static str {
        match self {
            ParallelKind::Parallel => "#pragma acc parallel loop",
            ParallelKind::Kernels => "#pragma acc kernels loop",
        }
    }
}

impl fmt::Display for ParallelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParallelKind::Parallel => write!(f, "parallel"),
            ParallelKind::Kernels => write!(f, "kernels"),
        }
    }
}

/// Introduce a parallel or kernels loop.
#[derive(Debug, Clone)]
pub struct Parallelize<'a> {
    pub target: &'a Stmt,
    pub kind: ParallelKind,
}

impl<'a> Parallelize<'a> {
    pub fn new(target: &'a Stmt, kind: ParallelKind) -> Self {
        Self { target, kind }
    }

    pub fn parallel(target: &'a Stmt) -> Self {
        Self::new(target, ParallelKind::Parallel)
    }

    pub fn kernels(target: &'a Stmt) -> Self {
        Self::new(target, ParallelKind::Kernels)
    }
}

fn is_acc_pragma(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Pragma(text) => {
            let mut words = text.trim_start_matches('#').split_whitespace();
            words.next() == Some("pragma") && words.next() == Some("acc")
        }
        _ => false,
    }
}

impl<'a> Refactoring<'a> for Parallelize<'a> {
    fn name(&self) -> &'static str {
        match self.kind {
            ParallelKind::Parallel => "Introduce Parallel Loop",
            ParallelKind::Kernels => "Introduce Kernels Loop",
        }
    }

    fn check_parameters(&self, _ctx: &RefactoringContext<'a>, _status: &mut RefactoringStatus) {}

    fn check_loop_form(&self, ctx: &RefactoringContext<'a>, status: &mut RefactoringStatus) {
        if !self.target.is_for() {
            status.add_fatal_error("Please select a for loop");
            return;
        }
        check_no_jumps(ctx, self.target, status);
        if let Some(existing) = ctx.index().pragmas_before(self.target).into_iter().find(|p| is_acc_pragma(p)) {
            status.add_fatal_error_at(
                format!(
                    "The loop already has an OpenACC directive: '{}' (line {})",
                    ctx.text(&existing.span).trim(),
                    existing.span.start_line
                ),
                existing.span,
            );
        }
    }

    fn check_dependences(&self, ctx: &RefactoringContext<'a>, status: &mut RefactoringStatus) {
        if !self.target.is_for() {
            return;
        }
        let Some(analysis) = analyze_or_report(ctx, self.target, status) else {
            return;
        };
        let Some(carried) = analysis.dependences().iter().find(|d| d.carried_level() == Some(0)) else {
            return;
        };
        let message = format!("The loop carries a dependence: {}", carried.description());
        match self.kind {
            ParallelKind::Parallel => status.add_error(message),
            ParallelKind::Kernels => status.add_warning(message),
        }
    }

    fn change(&self, ctx: &RefactoringContext<'a>, edits: &mut SourceEdits) -> Result<(), LoopForgeError> {
        insert_lines_before(ctx, self.target, &[self.kind.directive().to_string()], edits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parse;
    use crate::transform::{check, perform};
    use crate::utils::status::Severity;

    fn status_for(source: &str, kind: ParallelKind) -> RefactoringStatus {
        let unit = parse(source).unwrap();
        let ctx = RefactoringContext::new(&unit);
        check(&Parallelize::new(ctx.index().for_loops()[0], kind), &ctx)
    }

    #[test]
    fn test_independent_iterations() {
        let source = "void f(int a[10]) {\n    for (int i = 0; i < 10; i++)\n        a[i] = a[i] + 1;\n}\n";
        let unit = parse(source).unwrap();
        let ctx = RefactoringContext::new(&unit);
        let outcome = perform(&Parallelize::parallel(ctx.index().for_loops()[0]), &ctx).unwrap();
        assert!(outcome.status.is_ok());
        assert_eq!(
            outcome.apply(source).unwrap(),
            "void f(int a[10]) {\n    #pragma acc parallel loop\n    for (int i = 0; i < 10; i++)\n        a[i] = a[i] + 1;\n}\n"
        );
    }

    #[test]
    fn test_carried_dependence_error_or_warning() {
        let source = "void f(int a[10]) { for (int i = 1; i < 10; i++) a[i] = a[i - 1]; }";
        let status = status_for(source, ParallelKind::Parallel);
        assert_eq!(status.severity(), Severity::Error);
        assert!(status.mentions("carries a dependence"));

        let status = status_for(source, ParallelKind::Kernels);
        assert_eq!(status.severity(), Severity::Warning);
    }

    #[test]
    fn test_existing_directive_and_jumps_rejected() {
        let source = "void f() {\n#pragma acc kernels\nfor (i = 0; i < 4; i++) a[i] = 0;\n}";
        assert!(status_for(source, ParallelKind::Parallel).mentions("already has an OpenACC directive"));

        let source = "void f() { for (i = 0; i < 4; i++) { if (a[i]) break; a[i] = 1; } }";
        let status = status_for(source, ParallelKind::Kernels);
        assert!(status.has_fatal_error());
        assert!(status.mentions("jump"));
    }

    #[test]
    fn test_inner_loop_dependence_is_not_carried_by_outer() {
        let source = "void f() { for (i = 0; i < 8; i++) for (j = 1; j < 8; j++) a[i][j] = a[i][j - 1]; }";
        assert!(!status_for(source, ParallelKind::Parallel).has_error());
    }
}
