//! Loop unrolling.
//!
//! A counted loop with constant bounds is unrolled by `factor`: the main
//! loop runs `factor` copies of the body per iteration, and the iterations
//! left over when the trip count is not a multiple of `factor` are emitted
//! as a trailer of straight-line copies.
//!
//! ```text
//! for (int i = 0; i < 10; i++)
//!     a[i] = 0;
//! ```
//! becomes (factor 4):
//! ```text
//! for (int i = 0; i < 8; i += 4) {
//!     a[i] = 0;
//!     a[(i + 1)] = 0;
//!     a[(i + 2)] = 0;
//!     a[(i + 3)] = 0;
//! }
//! a[8] = 0;
//! a[9] = 0;
//! ```

use crate::context::RefactoringContext;
use crate::frontend::ast::{Stmt, StmtKind};
use crate::transform::{body_contents_span, check_no_jumps, declares_index, index_binding, substitute, Refactoring};
use crate::utils::errors::LoopForgeError;
use crate::utils::rewrite::SourceEdits;
use crate::utils::status::RefactoringStatus;

/// Loop unrolling.
#[derive(Debug, Clone)]
pub struct Unrolling<'a> {
    pub target: &'a Stmt,
    pub factor: i64,
}

/// Iteration counts of an unrolled loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnrollPlan {
    pub lower: i64,
    pub step: i64,
    pub trip_count: i64,
    /// Index increment of one unrolled iteration
    pub stride: i64,
    /// Iterations covered by the unrolled main loop
    pub main: i64,
    /// Iterations left for the trailer
    pub remainder: i64,
}

impl UnrollPlan {
    /// Plan for a loop running `lower..=upper` by `step`; `None` when an
    /// index value of the rewritten loop would not fit in an `i64`.
    pub fn new(lower: i64, upper: i64, step: i64, factor: i64) -> Option<Self> {
        if step <= 0 || factor <= 0 {
            return None;
        }
        let trip_count = if upper < lower {
            0
        } else {
            upper.checked_sub(lower)?.checked_div(step)?.checked_add(1)?
        };
        let main = trip_count / factor * factor;
        let plan = Self { lower, step, trip_count, stride: step.checked_mul(factor)?, main, remainder: trip_count - main };
        // Every other index value lies between `lower` and the exit value
        plan.exit_value()?;
        Some(plan)
    }

    /// Index value of iteration `n`, counting from zero.
    pub fn value_at(&self, n: i64) -> Option<i64> {
        n.checked_mul(self.step)?.checked_add(self.lower)
    }

    /// Index value once the loop has finished.
    pub fn exit_value(&self) -> Option<i64> {
        self.value_at(self.trip_count)
    }
}

impl<'a> Unrolling<'a> {
    pub fn new(target: &'a Stmt, factor: i64) -> Self {
        Self { target, factor }
    }

    pub fn plan(&self, ctx: &RefactoringContext<'a>) -> Option<UnrollPlan> {
        let inspector = ctx.inspect(self.target)?;
        UnrollPlan::new(
            inspector.lower_bound()?,
            inspector.inclusive_upper_bound()?,
            inspector.iteration_factor()?,
            self.factor,
        )
    }
}

fn literal(value: i64) -> String {
    if value < 0 {
        format!("({})", value)
    } else {
        value.to_string()
    }
}

impl<'a> Refactoring<'a> for Unrolling<'a> {
    fn name(&self) -> &'static str {
        "Unroll Loop"
    }

    fn check_parameters(&self, _ctx: &RefactoringContext<'a>, status: &mut RefactoringStatus) {
        if self.factor <= 0 {
            status.add_fatal_error(format!("Unroll factor must be positive (got {})", self.factor));
        }
    }

    fn check_loop_form(&self, ctx: &RefactoringContext<'a>, status: &mut RefactoringStatus) {
        let Some(inspector) = ctx.inspect(self.target) else {
            status.add_fatal_error("Please select a for loop");
            return;
        };
        if !inspector.is_counted_loop() {
            status.add_fatal_error("Loop must be a counted loop of the form 'for (i = LB; i < UB; i++)'");
            return;
        }
        check_no_jumps(ctx, self.target, status);
        if let Some(unsupported) = inspector.first_unsupported_stmt() {
            status.add_fatal_error_at(
                format!(
                    "Unsupported statement in loop body: '{}' (line {})",
                    ctx.text(&unsupported.span).trim(),
                    unsupported.span.start_line
                ),
                unsupported.span,
            );
        }
        if inspector.writes_index_variable() {
            status.add_fatal_error(format!(
                "The loop body assigns the index variable '{}'",
                inspector.index_variable().unwrap_or_default()
            ));
        }
        if inspector.lower_bound().is_none() {
            status.add_fatal_error("Lower bound is not a constant value.");
        }
        if inspector.inclusive_upper_bound().is_none() {
            status.add_fatal_error("Upper bound is not a constant value.");
        }
        match self.plan(ctx) {
            Some(plan) => status.add_info(format!(
                "{} iterations unrolled by {}, {} left for the trailer",
                plan.trip_count, self.factor, plan.remainder
            )),
            None if self.factor > 0
                && inspector.lower_bound().is_some()
                && inspector.inclusive_upper_bound().is_some() =>
            {
                status.add_fatal_error(format!(
                    "The iterations of the loop cannot be counted (step {})",
                    inspector.iteration_factor().map_or_else(|| "unknown".to_string(), |s| s.to_string())
                ))
            }
            None => {}
        }
    }

    fn change(&self, ctx: &RefactoringContext<'a>, edits: &mut SourceEdits) -> Result<(), LoopForgeError> {
        let (Some(plan), Some(for_loop)) = (self.plan(ctx), self.target.as_for()) else {
            return Err(LoopForgeError::Refused("Loop bounds are not constant".to_string()));
        };
        let (Some(init), Some(binding), Some(index)) = (
            for_loop.init,
            index_binding(ctx, self.target),
            ctx.inspect(self.target).and_then(|l| l.index_variable().map(str::to_string)),
        ) else {
            return Err(LoopForgeError::Refused("Loop has no index variable".to_string()));
        };
        let body = body_contents_span(for_loop.body);
        let copy = |replacement: &str| match body {
            Some(span) => substitute(ctx, self.target, span, &binding, replacement),
            None => String::new(),
        };

        let overflow = || LoopForgeError::Refused("Index value overflows".to_string());
        let indent = ctx.source().indentation_at(self.target.span.start_offset);
        let inner = format!("{}    ", indent);
        let mut lines = Vec::new();

        if plan.main > 0 {
            let init_text = match &init.kind {
                StmtKind::Expr(expr) => ctx.text(&expr.span),
                _ => ctx.text(&init.span).trim_end_matches(';'),
            };
            lines.push(format!(
                "for ({}; {} < {}; {} += {}) {{",
                init_text.trim(),
                index,
                plan.value_at(plan.main).ok_or_else(overflow)?,
                index,
                plan.stride
            ));
            lines.push(format!("{}{}", inner, copy(&index)));
            for k in 1..self.factor {
                lines.push(format!("{}{}", inner, copy(&format!("({} + {})", index, k * plan.step))));
            }
            lines.push(format!("{}}}", indent));
        }
        for n in plan.main..plan.trip_count {
            let value = plan.value_at(n).ok_or_else(overflow)?;
            lines.push(format!("{}{}", indent, copy(&literal(value))));
        }
        if !declares_index(self.target) {
            let exit = plan.exit_value().ok_or_else(overflow)?;
            lines.push(format!("{}{} = {};", indent, index, literal(exit)));
        }

        let text = if lines.is_empty() {
            ";".to_string()
        } else {
            lines.join("\n").trim_start().to_string()
        };
        log::debug!("unrolled loop at line {} into {} lines", self.target.span.start_line, lines.len());
        edits.replace(self.target.span.start_offset, self.target.span.len(), text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parse;
    use crate::transform::{check, perform};
    use crate::utils::status::Severity;

    fn unroll(source: &str, factor: i64) -> Result<String, LoopForgeError> {
        let unit = parse(source).unwrap();
        let ctx = RefactoringContext::new(&unit);
        let target = ctx.index().for_loops()[0];
        perform(&Unrolling::new(target, factor), &ctx)?.apply(source)
    }

    #[test]
    fn test_plan() {
        let plan = UnrollPlan::new(0, 9, 1, 4).unwrap();
        assert_eq!((plan.trip_count, plan.main, plan.remainder), (10, 8, 2));
        assert_eq!(plan.exit_value(), Some(10));

        let plan = UnrollPlan::new(2, 9, 3, 2).unwrap();
        assert_eq!((plan.trip_count, plan.main, plan.remainder), (3, 2, 1));
        assert_eq!(plan.value_at(2), Some(8));

        assert_eq!(UnrollPlan::new(5, 4, 1, 2).unwrap().trip_count, 0);
        assert!(UnrollPlan::new(0, 9, 1, 0).is_none());
        assert!(UnrollPlan::new(1, i64::MAX, 1, 2).is_none());
        assert!(UnrollPlan::new(0, 9, i64::MAX, 2).is_none());
    }

    #[test]
    fn test_uncountable_loops_fail_the_check() {
        for source in [
            "void f(int a[1]) { for (i = 1; i <= 9223372036854775807; i++) a[0] = 0; }",
            "void f(int a[10]) { for (i = 0; i < 10; i += 0) a[i] = 0; }",
        ] {
            let unit = parse(source).unwrap();
            let ctx = RefactoringContext::new(&unit);
            let status = check(&Unrolling::new(ctx.index().for_loops()[0], 2), &ctx);
            assert!(status.has_fatal_error(), "{}", source);
            assert!(status.mentions("cannot be counted"), "{}", source);
            assert!(matches!(unroll(source, 2), Err(LoopForgeError::Refused(_))));
        }
    }

    #[test]
    fn test_unroll_with_trailer() {
        let source = "void f(int a[10]) {\n  for (int i = 0; i < 10; i++)\n    a[i] = i;\n}\n";
        assert_eq!(
            unroll(source, 4).unwrap(),
            "void f(int a[10]) {\n  for (int i = 0; i < 8; i += 4) {\n      a[i] = i;\n      a[(i + 1)] = (i + 1);\n      a[(i + 2)] = (i + 2);\n      a[(i + 3)] = (i + 3);\n  }\n  a[8] = 8;\n  a[9] = 9;\n}\n"
        );
    }

    #[test]
    fn test_unroll_assigns_exit_value() {
        let source = "void f() {\n  for (i = 0; i <= 4; i += 2) { a[i] = 0; }\n}\n";
        assert_eq!(
            unroll(source, 2).unwrap(),
            "void f() {\n  for (i = 0; i < 4; i += 4) {\n      a[i] = 0;\n      a[(i + 2)] = 0;\n  }\n  a[4] = 0;\n  i = 6;\n}\n"
        );
    }

    #[test]
    fn test_non_constant_upper_bound() {
        let source = "void f(int n) { for (i = 0; i < n; i++) a[i] = 0; }";
        let unit = parse(source).unwrap();
        let ctx = RefactoringContext::new(&unit);
        let status = check(&Unrolling::new(ctx.index().for_loops()[0], 2), &ctx);
        assert_eq!(status.severity(), Severity::FatalError);
        assert!(status.messages(Severity::FatalError).contains(&"Upper bound is not a constant value."));
    }

    #[test]
    fn test_rejected_loop_forms() {
        let unit = parse("void f() { for (i = 0; i < 8; i++) { g(i); } }").unwrap();
        let ctx = RefactoringContext::new(&unit);
        let status = check(&Unrolling::new(ctx.index().for_loops()[0], 2), &ctx);
        assert!(status.mentions("Unsupported statement"));

        let unit = parse("void f() { for (i = 0; i < 8; i++) { i += 1; } }").unwrap();
        let ctx = RefactoringContext::new(&unit);
        let status = check(&Unrolling::new(ctx.index().for_loops()[0], 2), &ctx);
        assert!(status.mentions("assigns the index variable"));

        let unit = parse("void f() { for (i = 0; i < 8; i++) a[i] = 0; }").unwrap();
        let ctx = RefactoringContext::new(&unit);
        let status = check(&Unrolling::new(ctx.index().for_loops()[0], 0), &ctx);
        assert!(status.has_fatal_error());
    }
}
