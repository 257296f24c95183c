//! Loop interchange.
//!
//! Interchange swaps the outermost loop of a perfect nest with the loop
//! `depth` levels below it:
//!
//! ```text
//! for (i = 0; i < N; i++)
//!   for (j = 0; j < M; j++)
//!     A[i][j] = B[j][i];
//! ```
//! becomes (depth 1):
//! ```text
//! for (j = 0; j < M; j++)
//!   for (i = 0; i < N; i++)
//!     A[i][j] = B[j][i];
//! ```
//!
//! Only the header text moves. Pragma lines directly above either header
//! travel with their loop.

use crate::analysis::loops::perfect_loop_nest_headers;
use crate::context::RefactoringContext;
use crate::frontend::ast::Stmt;
use crate::transform::{analyze_or_report, check_no_jumps, insert_lines_before, line_range, Refactoring};
use crate::utils::errors::LoopForgeError;
use crate::utils::rewrite::SourceEdits;
use crate::utils::status::RefactoringStatus;

/// Loop interchange.
#[derive(Debug, Clone)]
pub struct Interchange<'a> {
    /// Outermost loop of the nest
    pub outer: &'a Stmt,
    /// Nest level to exchange with the outer loop
    pub depth: usize,
}

impl<'a> Interchange<'a> {
    pub fn new(outer: &'a Stmt, depth: usize) -> Self {
        Self { outer, depth }
    }

    fn is_well_formed(&self, ctx: &RefactoringContext<'a>) -> bool {
        self.depth >= 1
            && ctx
                .inspect(self.outer)
                .map_or(false, |inspector| inspector.is_perfect_loop_nest_to(self.depth))
    }
}

impl<'a> Refactoring<'a> for Interchange<'a> {
    fn name(&self) -> &'static str {
        "Interchange Loops"
    }

    fn check_parameters(&self, _ctx: &RefactoringContext<'a>, status: &mut RefactoringStatus) {
        if self.depth < 1 {
            status.add_fatal_error("Interchange depth must be at least 1");
        }
    }

    fn check_loop_form(&self, ctx: &RefactoringContext<'a>, status: &mut RefactoringStatus) {
        let Some(inspector) = ctx.inspect(self.outer) else {
            status.add_fatal_error("Please select a for loop");
            return;
        };
        check_no_jumps(ctx, self.outer, status);
        if self.depth >= 1 && !inspector.is_perfect_loop_nest_to(self.depth) {
            status.add_fatal_error(format!("Loop nest is not perfectly nested to depth {}", self.depth));
        }
    }

    fn check_dependences(&self, ctx: &RefactoringContext<'a>, status: &mut RefactoringStatus) {
        if !self.is_well_formed(ctx) {
            return;
        }
        let Some(analysis) = analyze_or_report(ctx, self.outer, status) else {
            return;
        };
        if let Some(dependence) = analysis.interchange_violation(self.depth) {
            log::info!("interchange blocked by {}", dependence);
            status.add_error(format!(
                "Interchanging with the loop at depth {} would reverse a dependence: {}",
                self.depth,
                dependence.description()
            ));
        }
    }

    fn change(&self, ctx: &RefactoringContext<'a>, edits: &mut SourceEdits) -> Result<(), LoopForgeError> {
        let headers = perfect_loop_nest_headers(self.outer);
        let (Some(&first), Some(&second)) = (headers.first(), headers.get(self.depth)) else {
            return Err(LoopForgeError::Refused(format!(
                "Loop nest is not perfectly nested to depth {}",
                self.depth
            )));
        };
        let (Some(first_loop), Some(second_loop)) = (first.as_for(), second.as_for()) else {
            return Ok(());
        };

        let first_span = first_loop.header_span;
        let second_span = second_loop.header_span;
        edits.replace(first_span.start_offset, first_span.len(), ctx.text(&second_span))?;
        edits.replace(second_span.start_offset, second_span.len(), ctx.text(&first_span))?;

        let first_pragmas = pragma_lines(ctx, first);
        let second_pragmas = pragma_lines(ctx, second);
        if first_pragmas.is_empty() && second_pragmas.is_empty() {
            return Ok(());
        }
        remove_pragmas(ctx, first, edits)?;
        remove_pragmas(ctx, second, edits)?;
        insert_lines_before(ctx, first, &second_pragmas, edits)?;
        insert_lines_before(ctx, second, &first_pragmas, edits)?;
        Ok(())
    }
}

fn pragma_lines(ctx: &RefactoringContext<'_>, stmt: &Stmt) -> Vec<String> {
    ctx.index()
        .pragmas_before(stmt)
        .into_iter()
        .map(|p| ctx.text(&p.span).trim().to_string())
        .collect()
}

fn remove_pragmas(ctx: &RefactoringContext<'_>, stmt: &Stmt, edits: &mut SourceEdits) -> Result<(), LoopForgeError> {
    let pragmas = ctx.index().pragmas_before(stmt);
    if let (Some(first), Some(last)) = (pragmas.first(), pragmas.last()) {
        let (start, end) = line_range(ctx.source(), first.span.start_offset, last.span.end_offset);
        edits.replace(start, end - start, "")?;
    }
    Ok(())
}
