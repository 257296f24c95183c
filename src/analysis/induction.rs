//! Induction variables of a loop nest.
//!
//! Dependence testing needs concrete bounds for every loop of the nest.
//! Only `name = lit` / `type name = lit` initializers and `<`, `<=`, `>`, `>=`
//! conditions against a constant are understood; anything else is a hard
//! failure naming the offending header part.

use crate::analysis::constant::ConstantOracle;
use crate::frontend::ast::*;
use crate::utils::errors::{DependenceFailureKind, DependenceTestFailure};
use crate::utils::location::SourceMap;
use std::fmt;

/// A loop variable with inclusive integer bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InductionVariable {
    pub name: String,
    pub lower: i64,
    pub upper: i64,
    /// The loop runs from `upper` down to `lower`
    pub descending: bool,
}

impl InductionVariable {
    pub fn new(name: impl Into<String>, lower: i64, upper: i64) -> Self {
        Self { name: name.into(), lower, upper, descending: false }
    }

    pub fn counting_down(mut self) -> Self {
        self.descending = true;
        self
    }

    /// `upper - lower`.
    pub fn trip_count(&self) -> i64 {
        self.upper.saturating_sub(self.lower)
    }

    /// Derive the induction variable of a `for` statement.
    ///
    /// The condition operand may be any expression the oracle can fold.
    /// Bounds are ordered with min/max; a `>`/`>=` condition marks the
    /// variable as counting down.
    pub fn derive(
        stmt: &Stmt,
        source: &SourceMap,
        oracle: &dyn ConstantOracle,
        scope: Option<&Function>,
    ) -> Result<Self, DependenceTestFailure> {
        let unsupported = |message: &str, span: &crate::utils::location::Span| {
            DependenceTestFailure::new(
                DependenceFailureKind::UnsupportedLoopHeader,
                format!("{}: '{}' (line {})", message, source.span_text(span), span.start_line),
            )
        };

        let for_loop = stmt
            .as_for()
            .ok_or_else(|| unsupported("Not a for loop", &stmt.span))?;
        let init = for_loop
            .init
            .ok_or_else(|| unsupported("Loop has no initializer", &for_loop.header_span))?;

        let (name, init_value) = match &init.kind {
            StmtKind::Decl(decl) if decl.declarators.len() == 1 => {
                let declarator = &decl.declarators[0];
                let value = declarator
                    .init
                    .as_ref()
                    .ok_or_else(|| unsupported("Loop variable has no initial value", &init.span))?;
                (declarator.name.as_str(), value)
            }
            StmtKind::Expr(expr) => match expr.as_assignment() {
                Some((BinaryOp::Assign, lhs, rhs)) => {
                    let name = lhs
                        .unparen()
                        .as_identifier()
                        .ok_or_else(|| unsupported("Unsupported loop initializer", &init.span))?;
                    (name, rhs)
                }
                _ => return Err(unsupported("Unsupported loop initializer", &init.span)),
            },
            _ => return Err(unsupported("Unsupported loop initializer", &init.span)),
        };
        let lower = oracle
            .evaluate(init_value, scope)
            .ok_or_else(|| unsupported("Initial value is not a constant", &init_value.span))?;

        let cond = for_loop
            .cond
            .ok_or_else(|| unsupported("Loop has no condition", &for_loop.header_span))?;
        let (op, bound) = match &cond.unparen().kind {
            ExprKind::Binary { op, left, right } if op.is_comparison() => {
                if left.unparen().as_identifier() == Some(name) {
                    (*op, &**right)
                } else if right.unparen().as_identifier() == Some(name) {
                    (op.mirrored(), &**left)
                } else {
                    return Err(unsupported("Condition does not test the loop variable", &cond.span));
                }
            }
            _ => return Err(unsupported("Unsupported loop condition", &cond.span)),
        };
        let limit = oracle
            .evaluate(bound, scope)
            .ok_or_else(|| unsupported("Loop bound is not a constant", &bound.span))?;
        let limit = match op {
            BinaryOp::Lt => limit.checked_sub(1),
            BinaryOp::Gt => limit.checked_add(1),
            BinaryOp::Le | BinaryOp::Ge => Some(limit),
            _ => return Err(unsupported("Unsupported relational operator", &cond.span)),
        }
        .ok_or_else(|| unsupported("Loop bound overflows", &bound.span))?;

        let iv = Self::new(name, lower.min(limit), lower.max(limit));
        Ok(if matches!(op, BinaryOp::Gt | BinaryOp::Ge) { iv.counting_down() } else { iv })
    }
}

impl fmt::Display for InductionVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in [{}, {}]", self.name, self.lower, self.upper)?;
        if self.descending {
            write!(f, " (down)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::constant::ConstantPropagator;
    use crate::frontend::{parse, Bindings};

    fn derive(source: &str) -> Result<InductionVariable, DependenceTestFailure> {
        let unit = parse(source).unwrap();
        let bindings = Bindings::resolve(&unit);
        let oracle = ConstantPropagator::new(&unit, &bindings);
        let func = &unit.functions[0];
        let stmt = collect_stmts(&func.body).into_iter().find(|s| s.is_for()).unwrap();
        InductionVariable::derive(stmt, &unit.source, &oracle, Some(func))
    }

    #[test]
    fn test_strict_and_inclusive_bounds() {
        assert_eq!(derive("void f() { for (i = 0; i < 10; i++) ; }").unwrap(), InductionVariable::new("i", 0, 9));
        assert_eq!(derive("void f() { for (int j = 2; j <= 8; j++) ; }").unwrap(), InductionVariable::new("j", 2, 8));
    }

    #[test]
    fn test_counting_down_is_normalised() {
        let iv = derive("void f() { for (int i = 10; i > 0; i--) ; }").unwrap();
        assert_eq!(iv, InductionVariable::new("i", 1, 10).counting_down());
        assert!(!derive("void f() { for (int i = 0; 10 > i; i++) ; }").unwrap().descending);
        let iv = derive("void f() { for (int i = 10; i >= 0; i--) ; }").unwrap();
        assert_eq!((iv.lower, iv.upper), (0, 10));
        assert_eq!(iv.trip_count(), 10);
    }

    #[test]
    fn test_named_constant_bound() {
        let iv = derive("#define UNUSED 1\nconst int N = 64; void f() { for (int i = 0; i < N; i++) ; }").unwrap();
        assert_eq!(iv.upper, 63);
    }

    #[test]
    fn test_failures_name_the_subtree() {
        let err = derive("void f(int n) { for (int i = 0; i < n; i++) ; }").unwrap_err();
        assert_eq!(err.kind, DependenceFailureKind::UnsupportedLoopHeader);
        assert!(err.cause.contains("'n'"));
        assert!(derive("void f() { for (i = 0; i != 4; i++) ; }").is_err());
        assert!(derive("void f() { for (i = 0, j = 0; i < 4; i++) ; }").is_err());
        assert!(derive("void f() { for (i = 0; j < 4; i++) ; }").is_err());
    }
}
