//! Strip-mining.
//!
//! Splits one loop of a perfect nest into a by-strip loop that advances
//! `factor` iterations of the index space at a time and an in-strip loop
//! that walks one strip with the original step:
//!
//! ```text
//! for (int i = 0; i < n; i += 2)
//! ```
//! becomes (factor 4):
//! ```text
//! for (int i_0 = 0; i_0 < n; i_0 += 4)
//!     for (int i = i_0; i < i_0 + 4 && i < n; i += 2)
//! ```
//!
//! The factor must be a multiple of the loop's step and larger than it,
//! otherwise strips would not start on iterations of the original loop.

use crate::analysis::loops::perfect_loop_nest_headers;
use crate::context::RefactoringContext;
use crate::frontend::ast::*;
use crate::transform::{check_no_jumps, declares_index, fresh_name, index_type, Refactoring};
use crate::utils::errors::LoopForgeError;
use crate::utils::rewrite::SourceEdits;
use crate::utils::status::RefactoringStatus;
use std::collections::HashSet;

/// Strip-mining of the loop `depth` levels below `outer`.
#[derive(Debug, Clone)]
pub struct StripMining<'a> {
    pub outer: &'a Stmt,
    pub factor: i64,
    pub depth: usize,
}

/// Source text pieces of a counted loop header, enough to write by-strip
/// and in-strip headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HeaderParts {
    ty: String,
    declares: bool,
    pub(crate) index: String,
    lower: String,
    op: &'static str,
    upper: String,
    iter: String,
}

impl HeaderParts {
    pub(crate) fn of(ctx: &RefactoringContext<'_>, stmt: &Stmt) -> Option<Self> {
        let for_loop = stmt.as_for()?;
        let (index, lower) = match &for_loop.init?.kind {
            StmtKind::Decl(decl) if decl.declarators.len() == 1 => {
                let declarator = &decl.declarators[0];
                (declarator.name.clone(), declarator.init.as_ref()?)
            }
            StmtKind::Expr(expr) => match expr.as_assignment()? {
                (BinaryOp::Assign, lhs, rhs) => (lhs.unparen().as_identifier()?.to_string(), rhs),
                _ => return None,
            },
            _ => return None,
        };

        let ExprKind::Binary { op, left, right } = &for_loop.cond?.unparen().kind else {
            return None;
        };
        let (op, upper) = if left.unparen().as_identifier() == Some(index.as_str()) {
            (*op, &**right)
        } else if right.unparen().as_identifier() == Some(index.as_str()) {
            (op.mirrored(), &**left)
        } else {
            return None;
        };
        let op = match op {
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            _ => return None,
        };

        Some(Self {
            ty: index_type(stmt),
            declares: declares_index(stmt),
            index,
            lower: ctx.text(&lower.span).to_string(),
            op,
            upper: ctx.text(&upper.span).to_string(),
            iter: ctx.text(&for_loop.iter?.span).to_string(),
        })
    }

    /// `for (T s = LB; s OP UB; s += F)`
    pub(crate) fn by_strip(&self, strip: &str, factor: i64) -> String {
        format!(
            "for ({} {} = {}; {} {} {}; {} += {})",
            self.ty, strip, self.lower, strip, self.op, self.upper, strip, factor
        )
    }

    /// `for (T i = s; i < s + F && i OP UB; ITER)`
    pub(crate) fn in_strip(&self, strip: &str, factor: i64) -> String {
        let init = if self.declares {
            format!("{} {} = {}", self.ty, self.index, strip)
        } else {
            format!("{} = {}", self.index, strip)
        };
        format!(
            "for ({}; {} < {} + {} && {} {} {}; {})",
            init, self.index, strip, factor, self.index, self.op, self.upper, self.iter
        )
    }
}

/// FATAL unless `factor` is a multiple of `step` and larger than it.
pub(crate) fn check_strip_factor(factor: i64, step: Option<i64>, depth: usize, status: &mut RefactoringStatus) {
    let Some(step) = step else {
        status.add_fatal_error(format!("The iteration factor of the loop at depth {} is unknown", depth));
        return;
    };
    if factor % step != 0 {
        status.add_fatal_error(format!(
            "The factor {} is not divisible by the iteration factor {} of the loop at depth {}",
            factor, step, depth
        ));
    }
    if factor <= step {
        status.add_fatal_error(format!(
            "The factor {} must be greater than the iteration factor {} of the loop at depth {}",
            factor, step, depth
        ));
    }
}

impl<'a> StripMining<'a> {
    pub fn new(outer: &'a Stmt, factor: i64, depth: usize) -> Self {
        Self { outer, factor, depth }
    }

    /// The loop being strip-mined.
    pub fn target(&self) -> Option<&'a Stmt> {
        perfect_loop_nest_headers(self.outer).get(self.depth).copied()
    }
}

impl<'a> Refactoring<'a> for StripMining<'a> {
    fn name(&self) -> &'static str {
        "Strip-Mine Loop"
    }

    fn check_parameters(&self, ctx: &RefactoringContext<'a>, status: &mut RefactoringStatus) {
        if self.factor <= 0 {
            status.add_fatal_error(format!("Strip factor must be positive (got {})", self.factor));
            return;
        }
        let Some(inspector) = ctx.inspect(self.outer) else {
            status.add_fatal_error("Please select a for loop");
            return;
        };
        let levels = inspector.perfect_loop_nest_headers().len();
        if self.depth >= levels {
            status.add_fatal_error(format!(
                "Depth {} is outside the perfect loop nest ({} levels)",
                self.depth, levels
            ));
            return;
        }
        check_strip_factor(self.factor, inspector.iteration_factor_at(self.depth), self.depth, status);
    }

    fn check_loop_form(&self, ctx: &RefactoringContext<'a>, status: &mut RefactoringStatus) {
        let Some(target) = self.target() else {
            return;
        };
        let Some(inspector) = ctx.inspect(target) else {
            return;
        };
        check_no_jumps(ctx, target, status);
        if !inspector.is_counted_loop() || HeaderParts::of(ctx, target).is_none() {
            status.add_fatal_error(format!(
                "The loop at depth {} must be a counted loop of the form 'for (i = LB; i < UB; i += S)'",
                self.depth
            ));
        }
    }

    fn change(&self, ctx: &RefactoringContext<'a>, edits: &mut SourceEdits) -> Result<(), LoopForgeError> {
        let Some((target, parts)) = self.target().and_then(|t| Some((t, HeaderParts::of(ctx, t)?))) else {
            return Err(LoopForgeError::Refused("Loop header is not supported".to_string()));
        };
        let Some(for_loop) = target.as_for() else {
            return Ok(());
        };
        let strip = fresh_name(ctx.scope_of(target), &parts.index, &HashSet::new());
        let indent = ctx.source().indentation_at(target.span.start_offset);
        let text = format!(
            "{}\n{}    {}",
            parts.by_strip(&strip, self.factor),
            indent,
            parts.in_strip(&strip, self.factor)
        );
        log::debug!("strip-mining loop at line {} with strip variable {}", target.span.start_line, strip);
        edits.replace(for_loop.header_span.start_offset, for_loop.header_span.len(), text)?;
        Ok(())
    }
}
