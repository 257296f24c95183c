//! Loop fusion.
//!
//! Fusion merges a loop with a following loop whose header is the same up
//! to the name of the index variable:
//!
//! ```text
//! for (i = 0; i < 10; i++) a[i] = 0;
//! for (k = 0; k < 10; k++) b[k] = a[k];
//! ```
//! becomes:
//! ```text
//! for (i = 0; i < 10; i++) {
//!     a[i] = 0;
//!     b[i] = a[i];
//! }
//! ```
//!
//! The partner is the next loop in the same block, or the one after that
//! when exactly one incompatible loop sits in between. Dependences between
//! the two bodies are not analysed; every fusion carries a warning saying
//! so.

use crate::context::RefactoringContext;
use crate::frontend::ast::*;
use crate::transform::{
    body_contents_span, check_no_jumps, declares_index, index_binding, line_range, starts_line, substitute,
    Refactoring,
};
use crate::utils::errors::LoopForgeError;
use crate::utils::rewrite::SourceEdits;
use crate::utils::status::RefactoringStatus;

/// Loop fusion.
#[derive(Debug, Clone)]
pub struct Fusion<'a> {
    /// The loop the second loop's body is merged into
    pub first: &'a Stmt,
}

impl<'a> Fusion<'a> {
    pub fn new(first: &'a Stmt) -> Self {
        Self { first }
    }

    /// The loop that would be fused into `first`.
    pub fn partner(&self, ctx: &RefactoringContext<'a>) -> Option<&'a Stmt> {
        fusion_candidate(ctx, self.first)
    }
}

/// Index variable name of a loop, from its initializer.
fn index_name(stmt: &Stmt) -> Option<&str> {
    match &stmt.as_for()?.init?.kind {
        StmtKind::Decl(decl) if decl.declarators.len() == 1 => Some(decl.declarators[0].name.as_str()),
        StmtKind::Expr(expr) => expr.as_assignment()?.1.unparen().as_identifier(),
        _ => None,
    }
}

/// The next loop in `first`'s block whose header unifies with `first`'s,
/// skipping pragmas and at most one other loop.
pub fn fusion_candidate<'a>(ctx: &RefactoringContext<'a>, first: &Stmt) -> Option<&'a Stmt> {
    let following: Vec<&'a Stmt> = ctx
        .index()
        .following_siblings(first)
        .into_iter()
        .filter(|s| !s.is_pragma())
        .take(2)
        .collect();
    match following.as_slice() {
        [next, ..] if next.is_for() && headers_unify(first, next) => Some(*next),
        [next, after] if next.is_for() && after.is_for() && headers_unify(first, after) => Some(*after),
        _ => None,
    }
}

/// True when the two loop headers are identical except that `first`'s
/// index variable is spelled differently in `second`.
pub fn headers_unify(first: &Stmt, second: &Stmt) -> bool {
    let (Some(a), Some(b)) = (first.as_for(), second.as_for()) else {
        return false;
    };
    let (Some(index_a), Some(index_b)) = (index_name(first), index_name(second)) else {
        return false;
    };
    let unifier = Unifier { index_a, index_b };
    unifier.stmt(a.init, b.init) && unifier.opt_expr(a.cond, b.cond) && unifier.opt_expr(a.iter, b.iter)
}

struct Unifier<'n> {
    index_a: &'n str,
    index_b: &'n str,
}

impl Unifier<'_> {
    fn stmt(&self, a: Option<&Stmt>, b: Option<&Stmt>) -> bool {
        match (a.map(|s| &s.kind), b.map(|s| &s.kind)) {
            (None, None) => true,
            (Some(StmtKind::Expr(a)), Some(StmtKind::Expr(b))) => self.expr(a, b),
            (Some(StmtKind::Decl(a)), Some(StmtKind::Decl(b))) => {
                a.specifiers == b.specifiers
                    && a.declarators.len() == b.declarators.len()
                    && a.declarators.iter().zip(&b.declarators).all(|(x, y)| {
                        self.name(&x.name, &y.name)
                            && x.pointer_depth == y.pointer_depth
                            && x.array_dims.is_empty()
                            && y.array_dims.is_empty()
                            && self.opt_expr(x.init.as_ref(), y.init.as_ref())
                    })
            }
            _ => false,
        }
    }

    fn opt_expr(&self, a: Option<&Expr>, b: Option<&Expr>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => self.expr(a, b),
            _ => false,
        }
    }

    fn name(&self, a: &str, b: &str) -> bool {
        if a == self.index_a || b == self.index_b {
            a == self.index_a && b == self.index_b
        } else {
            a == b
        }
    }

    fn expr(&self, a: &Expr, b: &Expr) -> bool {
        use ExprKind::*;
        match (&a.kind, &b.kind) {
            (IntLiteral(x), IntLiteral(y)) => x == y,
            (FloatLiteral(x), FloatLiteral(y)) => x == y,
            (CharLiteral(x), CharLiteral(y)) | (StringLiteral(x), StringLiteral(y)) => x == y,
            (Identifier(x), Identifier(y)) => self.name(x, y),
            (Subscript { array: a1, index: i1 }, Subscript { array: a2, index: i2 }) => {
                self.expr(a1, a2) && self.expr(i1, i2)
            }
            (Binary { op: o1, left: l1, right: r1 }, Binary { op: o2, left: l2, right: r2 }) => {
                o1 == o2 && self.expr(l1, l2) && self.expr(r1, r2)
            }
            (Unary { op: o1, operand: x1 }, Unary { op: o2, operand: x2 }) => o1 == o2 && self.expr(x1, x2),
            (Call { callee: c1, args: a1 }, Call { callee: c2, args: a2 }) => {
                self.expr(c1, c2) && a1.len() == a2.len() && a1.iter().zip(a2).all(|(x, y)| self.expr(x, y))
            }
            (Member { base: b1, field: f1, arrow: w1 }, Member { base: b2, field: f2, arrow: w2 }) => {
                f1 == f2 && w1 == w2 && self.expr(b1, b2)
            }
            (Paren(x), Paren(y)) => self.expr(x, y),
            (Cast { ty: t1, expr: x1 }, Cast { ty: t2, expr: x2 }) => t1 == t2 && self.expr(x1, x2),
            (SizeofType(x), SizeofType(y)) => x == y,
            (
                Conditional { cond: c1, then_expr: t1, else_expr: e1 },
                Conditional { cond: c2, then_expr: t2, else_expr: e2 },
            ) => self.expr(c1, c2) && self.expr(t1, t2) && self.expr(e1, e2),
            _ => false,
        }
    }
}

/// True when `body` already uses or declares `to`, so renaming the index
/// variable to `to` would capture it.
fn renaming_captures(body: &Stmt, to: &str) -> bool {
    let used = collect_exprs(body).into_iter().any(|e| e.as_identifier() == Some(to));
    let declared = collect_stmts(body).into_iter().any(|s| match &s.kind {
        StmtKind::Decl(decl) => decl.declarators.iter().any(|d| d.name == to),
        _ => false,
    });
    used || declared
}

impl<'a> Refactoring<'a> for Fusion<'a> {
    fn name(&self) -> &'static str {
        "Fuse Loops"
    }

    fn check_parameters(&self, _ctx: &RefactoringContext<'a>, _status: &mut RefactoringStatus) {}

    fn check_loop_form(&self, ctx: &RefactoringContext<'a>, status: &mut RefactoringStatus) {
        if !self.first.is_for() {
            status.add_fatal_error("Please select a for loop");
            return;
        }
        check_no_jumps(ctx, self.first, status);
        let Some(second) = self.partner(ctx) else {
            status.add_fatal_error("There is no adjacent loop with a compatible header to fuse with");
            return;
        };
        check_no_jumps(ctx, second, status);
        log::debug!(
            "fusing loop at line {} with loop at line {}",
            self.first.span.start_line,
            second.span.start_line
        );

        let (Some(index_a), Some(index_b)) = (index_name(self.first), index_name(second)) else {
            return;
        };
        if index_a != index_b {
            if let Some(body) = second.as_for().map(|f| f.body) {
                if renaming_captures(body, index_a) {
                    status.add_fatal_error(format!(
                        "Renaming '{}' to '{}' would capture an existing variable",
                        index_b, index_a
                    ));
                }
            }
            if !declares_index(second) {
                status.add_warning(format!(
                    "'{}' is no longer assigned once the loops are fused",
                    index_b
                ));
            }
        }

        let skipped = ctx
            .index()
            .following_siblings(self.first)
            .into_iter()
            .find(|s| !s.is_pragma())
            .filter(|s| s.id != second.id);
        if let Some(skipped) = skipped {
            status.add_warning(format!(
                "The loop at line {} is moved past the loop at line {}",
                second.span.start_line, skipped.span.start_line
            ));
        }
    }

    fn check_dependences(&self, _ctx: &RefactoringContext<'a>, status: &mut RefactoringStatus) {
        status.add_warning("Dependences between the fused loop bodies are not checked");
    }

    fn change(&self, ctx: &RefactoringContext<'a>, edits: &mut SourceEdits) -> Result<(), LoopForgeError> {
        let Some(second) = self.partner(ctx) else {
            return Err(LoopForgeError::Refused("No loop to fuse with".to_string()));
        };
        let (Some(first_loop), Some(second_loop)) = (self.first.as_for(), second.as_for()) else {
            return Ok(());
        };
        let source = ctx.source();

        let moved = match body_contents_span(second_loop.body) {
            Some(span) => match (index_name(self.first), index_binding(ctx, second)) {
                (Some(index), Some(binding)) => substitute(ctx, second, span, &binding, index),
                _ => ctx.text(&span).to_string(),
            },
            None => String::new(),
        };

        let body = first_loop.body;
        let outer_indent = source.indentation_at(self.first.span.start_offset);
        match &body.kind {
            StmtKind::Compound(stmts) if !moved.is_empty() => {
                let (offset, indent) = match stmts.last() {
                    Some(last) => (last.span.end_offset, source.indentation_at(last.span.start_offset).to_string()),
                    None => (body.span.start_offset + 1, format!("{}    ", outer_indent)),
                };
                edits.insert(offset, format!("\n{}{}", indent, moved))?;
            }
            StmtKind::Compound(_) => {}
            _ => {
                let inner_indent = if starts_line(source, body.span.start_offset) {
                    source.indentation_at(body.span.start_offset).to_string()
                } else {
                    format!("{}    ", outer_indent)
                };
                let start = first_loop.header_span.end_offset;
                let mut text = format!("{{\n{}{}", inner_indent, ctx.text(&body.span));
                if !moved.is_empty() {
                    text.push_str(&format!("\n{}{}", inner_indent, moved));
                }
                text.push_str(&format!("\n{}}}", outer_indent));
                edits.replace(start, body.span.end_offset - start, format!(" {}", text))?;
            }
        }

        let pragmas = ctx.index().pragmas_before(second);
        let start = pragmas.first().map_or(second.span.start_offset, |p| p.span.start_offset);
        let end = second.span.end_offset;
        let rest_of_line = source.source()[end..].split('\n').next().unwrap_or("");
        if starts_line(source, start) && rest_of_line.trim().is_empty() {
            let (line_start, line_end) = line_range(source, start, end);
            edits.replace(line_start, line_end - line_start, "")?;
        } else {
            edits.replace(start, end - start, "")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parse;
    use crate::transform::{check, perform};
    use crate::utils::status::Severity;

    fn loops(source: &str) -> Vec<Stmt> {
        let unit = parse(source).unwrap();
        unit.functions[0].body.body_statements().into_iter().filter(|s| s.is_for()).cloned().collect()
    }

    #[test]
    fn test_headers_unify_modulo_index_name() {
        let l = loops("void f() { for (i = 0; i < 10; i++) ; for (k = 0; k < 10; k++) ; }");
        assert!(headers_unify(&l[0], &l[1]));

        let l = loops("void f() { for (int i = 0; i < n; i += 2) ; for (int k = 0; k < n; k += 2) ; }");
        assert!(headers_unify(&l[0], &l[1]));

        let l = loops("void f() { for (i = 0; i < 10; i++) ; for (k = 0; k < 11; k++) ; }");
        assert!(!headers_unify(&l[0], &l[1]));

        let l = loops("void f() { for (i = 0; i < 10; i++) ; for (k = 0; i < 10; k++) ; }");
        assert!(!headers_unify(&l[0], &l[1]));

        let l = loops("void f() { for (int i = 0; i < 10; i++) ; for (long k = 0; k < 10; k++) ; }");
        assert!(!headers_unify(&l[0], &l[1]));
    }

    #[test]
    fn test_fuse_adjacent_loops() {
        let source = "void f(int a[10], int b[10]) {\n    for (int i = 0; i < 10; i++)\n        a[i] = 0;\n    for (int k = 0; k < 10; k++) {\n        b[k] = a[k];\n    }\n}\n";
        let unit = parse(source).unwrap();
        let ctx = RefactoringContext::new(&unit);
        let first = ctx.index().for_loops()[0];
        let outcome = perform(&Fusion::new(first), &ctx).unwrap();
        assert_eq!(outcome.status.severity(), Severity::Warning);
        assert_eq!(
            outcome.apply(source).unwrap(),
            "void f(int a[10], int b[10]) {\n    for (int i = 0; i < 10; i++) {\n        a[i] = 0;\n        b[i] = a[i];\n    }\n}\n"
        );
    }

    #[test]
    fn test_fuse_into_compound_body() {
        let source = "void f() {\n  for (i = 0; i < 4; i++) {\n    a[i] = 0;\n  }\n  #pragma ivdep\n  for (i = 0; i < 4; i++)\n    b[i] = 1;\n}\n";
        let unit = parse(source).unwrap();
        let ctx = RefactoringContext::new(&unit);
        let first = ctx.index().for_loops()[0];
        let outcome = perform(&Fusion::new(first), &ctx).unwrap();
        assert_eq!(
            outcome.apply(source).unwrap(),
            "void f() {\n  for (i = 0; i < 4; i++) {\n    a[i] = 0;\n    b[i] = 1;\n  }\n}\n"
        );
    }

    #[test]
    fn test_skips_one_intervening_loop() {
        let source = "void f() {\n  for (i = 0; i < 4; i++) a[i] = 0;\n  for (j = 0; j < 8; j++) c[j] = 0;\n  for (k = 0; k < 4; k++) b[k] = 1;\n}\n";
        let unit = parse(source).unwrap();
        let ctx = RefactoringContext::new(&unit);
        let first = ctx.index().for_loops()[0];
        let fusion = Fusion::new(first);
        assert_eq!(fusion.partner(&ctx).map(|s| s.span.start_line), Some(4));
        let status = check(&fusion, &ctx);
        assert!(status.mentions("moved past the loop at line 3"));
        assert!(status.mentions("'k' is no longer assigned"));
        assert!(!status.has_error());
    }

    #[test]
    fn test_no_partner_and_capture() {
        let source = "void f() { for (i = 0; i < 4; i++) a[i] = 0; x = 1; for (k = 0; k < 4; k++) b[k] = 1; }";
        let unit = parse(source).unwrap();
        let ctx = RefactoringContext::new(&unit);
        let status = check(&Fusion::new(ctx.index().for_loops()[0]), &ctx);
        assert_eq!(status.severity(), Severity::FatalError);

        let source = "void f() { for (int i = 0; i < 4; i++) a[i] = 0; for (int k = 0; k < 4; k++) b[k] = i; }";
        let unit = parse(source).unwrap();
        let ctx = RefactoringContext::new(&unit);
        let status = check(&Fusion::new(ctx.index().for_loops()[0]), &ctx);
        assert!(status.mentions("would capture"));
    }
}
