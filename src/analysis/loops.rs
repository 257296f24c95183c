//! Loop nest inspection.
//!
//! [`LoopInspector`] answers structural questions about a `for` statement
//! and the nest below it: is it a counted loop, what are its bounds and
//! step, how deep is the perfect nest, and are the innermost statements
//! simple enough to transform. Header facts are derived once per request
//! and cached in the [`LoopCache`] owned by the request context.

use crate::analysis::constant::ConstantOracle;
use crate::analysis::patterns::match_counted_loop;
use crate::context::RefactoringContext;
use crate::frontend::ast::*;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Facts derived from one loop header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopHeader {
    pub id: NodeId,
    /// Loop variable, when the initializer names one
    pub index: Option<String>,
    /// Matches the counted-loop catalog
    pub counted: bool,
    /// Constant initial value
    pub lower: Option<i64>,
    /// Constant inclusive upper bound of an up-counting loop
    pub upper: Option<i64>,
    /// Absolute step (see [`iteration_factor`])
    pub step: Option<i64>,
}

impl LoopHeader {
    /// Derive the header facts of `stmt`, or `None` if it is not a `for`.
    pub fn derive(stmt: &Stmt, oracle: &dyn ConstantOracle, scope: Option<&Function>) -> Option<Self> {
        let for_loop = stmt.as_for()?;
        let matched = match_counted_loop(stmt);

        let (declared, init_value) = match for_loop.init.map(|s| &s.kind) {
            Some(StmtKind::Decl(decl)) if decl.declarators.len() == 1 => {
                let d = &decl.declarators[0];
                (Some(d.name.clone()), d.init.as_ref())
            }
            Some(StmtKind::Expr(expr)) => match expr.as_assignment() {
                Some((BinaryOp::Assign, lhs, rhs)) => (lhs.unparen().as_identifier().map(str::to_string), Some(rhs)),
                _ => (None, None),
            },
            _ => (None, None),
        };
        let index = matched
            .as_ref()
            .and_then(|(_, bindings)| bindings.get("i").cloned())
            .or(declared);

        let lower = init_value.and_then(|e| oracle.evaluate(e, scope));
        let upper = index
            .as_deref()
            .and_then(|name| inclusive_upper(for_loop.cond?, name, oracle, scope));

        Some(Self {
            id: stmt.id,
            index,
            counted: matched.is_some(),
            lower,
            upper,
            step: iteration_factor(stmt),
        })
    }
}

/// `ub - 1` for `i < ub`, `ub` for `i <= ub` (either operand order).
fn inclusive_upper(cond: &Expr, index: &str, oracle: &dyn ConstantOracle, scope: Option<&Function>) -> Option<i64> {
    let ExprKind::Binary { op, left, right } = &cond.unparen().kind else {
        return None;
    };
    let (op, bound) = if left.unparen().as_identifier() == Some(index) {
        (*op, &**right)
    } else if right.unparen().as_identifier() == Some(index) {
        (op.mirrored(), &**left)
    } else {
        return None;
    };
    let value = oracle.evaluate(bound, scope)?;
    match op {
        BinaryOp::Lt => value.checked_sub(1),
        BinaryOp::Le => Some(value),
        _ => None,
    }
}

/// The absolute step of a loop: the sole integer literal in the iteration
/// expression, or 1 when it has none (`i++`).
///
/// `None` when there is no iteration expression, more than one literal, or
/// a zero step.
pub fn iteration_factor(stmt: &Stmt) -> Option<i64> {
    let iter = stmt.as_for()?.iter?;
    let mut literals = Vec::new();
    iter.walk(&mut |e| {
        if let Some(value) = e.as_int_literal() {
            literals.push(value);
        }
    });
    match literals.as_slice() {
        [] => Some(1),
        [value] => value.checked_abs().filter(|&v| v > 0),
        _ => None,
    }
}

/// How a loop's body continues the nest.
#[derive(Debug, Clone, Copy)]
pub enum Nesting<'a> {
    /// No `for` among the body statements
    Leaf,
    /// The body is exactly one `for`
    Single(&'a Stmt),
    /// A `for` alongside other statements
    Imperfect(&'a Stmt),
}

/// Classify the body of `stmt`. Pragmas are not counted as statements.
pub fn nesting(stmt: &Stmt) -> Nesting<'_> {
    let Some(for_loop) = stmt.as_for() else {
        return Nesting::Leaf;
    };
    let children = for_loop.body.body_statements();
    match children.iter().copied().find(|s| s.is_for()) {
        None => Nesting::Leaf,
        Some(inner) if children.len() == 1 => Nesting::Single(inner),
        Some(inner) => Nesting::Imperfect(inner),
    }
}

/// The headers of the perfect nest rooted at `stmt`, outermost first.
pub fn perfect_loop_nest_headers(stmt: &Stmt) -> Vec<&Stmt> {
    let mut headers = vec![stmt];
    let mut current = stmt;
    while let Nesting::Single(inner) = nesting(current) {
        headers.push(inner);
        current = inner;
    }
    headers
}

/// The first `break`, `continue`, `goto` or `return` inside `stmt`.
pub fn first_jump(stmt: &Stmt) -> Option<&Stmt> {
    collect_stmts(stmt).into_iter().find(|s| {
        matches!(
            s.kind,
            StmtKind::Break | StmtKind::Continue | StmtKind::Goto(_) | StmtKind::Return(_)
        )
    })
}

/// True for `=`, compound assignments, and `++`/`--`.
pub fn is_assignment_or_increment(expr: &Expr) -> bool {
    match &expr.unparen().kind {
        ExprKind::Binary { op, .. } => op.is_assignment(),
        ExprKind::Unary { op, .. } => op.is_increment(),
        _ => false,
    }
}

fn first_unsupported(stmt: &Stmt) -> Option<&Stmt> {
    match &stmt.kind {
        StmtKind::Null | StmtKind::Decl(_) | StmtKind::Pragma(_) => None,
        StmtKind::Compound(children) => children.iter().find_map(first_unsupported),
        StmtKind::Expr(expr) if is_assignment_or_increment(expr) => None,
        _ => Some(stmt),
    }
}

/// Per-request cache of derived loop headers.
#[derive(Debug, Default)]
pub struct LoopCache {
    headers: RefCell<HashMap<NodeId, Rc<LoopHeader>>>,
}

impl LoopCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached header for `id`, deriving it on first use.
    pub fn get_or_derive(&self, id: NodeId, derive: impl FnOnce() -> Option<LoopHeader>) -> Option<Rc<LoopHeader>> {
        if let Some(header) = self.headers.borrow().get(&id) {
            return Some(Rc::clone(header));
        }
        let header = Rc::new(derive()?);
        self.headers.borrow_mut().insert(id, Rc::clone(&header));
        Some(header)
    }

    pub fn len(&self) -> usize {
        self.headers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.borrow().is_empty()
    }
}

/// Structural queries on one `for` statement.
#[derive(Clone)]
pub struct LoopInspector<'c, 'a> {
    ctx: &'c RefactoringContext<'a>,
    stmt: &'a Stmt,
    header: Rc<LoopHeader>,
}

impl<'c, 'a> LoopInspector<'c, 'a> {
    /// Inspect `stmt`; `None` if it is not a `for` statement.
    pub fn new(ctx: &'c RefactoringContext<'a>, stmt: &'a Stmt) -> Option<Self> {
        let header = ctx.loops().get_or_derive(stmt.id, || {
            LoopHeader::derive(stmt, ctx.oracle(), ctx.scope_of(stmt))
        })?;
        Some(Self { ctx, stmt, header })
    }

    pub fn stmt(&self) -> &'a Stmt {
        self.stmt
    }

    pub fn header(&self) -> &LoopHeader {
        &self.header
    }

    pub fn is_counted_loop(&self) -> bool {
        self.header.counted
    }

    pub fn index_variable(&self) -> Option<&str> {
        self.header.index.as_deref()
    }

    pub fn lower_bound(&self) -> Option<i64> {
        self.header.lower
    }

    pub fn inclusive_upper_bound(&self) -> Option<i64> {
        self.header.upper
    }

    /// True unless some level of the nest has a `for` next to other
    /// statements. A loop with no nested loop is trivially perfect.
    pub fn is_perfect_loop_nest(&self) -> bool {
        let mut current = self.stmt;
        loop {
            match nesting(current) {
                Nesting::Leaf => return true,
                Nesting::Single(inner) => current = inner,
                Nesting::Imperfect(_) => return false,
            }
        }
    }

    /// True when the first `depth` bodies are each exactly one `for`.
    /// Deeper levels are not inspected.
    pub fn is_perfect_loop_nest_to(&self, depth: usize) -> bool {
        let mut current = self.stmt;
        for _ in 0..depth {
            match nesting(current) {
                Nesting::Single(inner) => current = inner,
                _ => return false,
            }
        }
        true
    }

    pub fn perfect_loop_nest_headers(&self) -> Vec<&'a Stmt> {
        perfect_loop_nest_headers(self.stmt)
    }

    /// Inspector for the loop `depth` levels down the perfect nest.
    pub fn nested(&self, depth: usize) -> Option<LoopInspector<'c, 'a>> {
        let headers = self.perfect_loop_nest_headers();
        LoopInspector::new(self.ctx, headers.get(depth)?)
    }

    pub fn iteration_factor(&self) -> Option<i64> {
        self.header.step
    }

    pub fn iteration_factor_at(&self, depth: usize) -> Option<i64> {
        self.nested(depth)?.iteration_factor()
    }

    pub fn innermost(&self) -> &'a Stmt {
        let headers = self.perfect_loop_nest_headers();
        headers.last().copied().unwrap_or(self.stmt)
    }

    /// The first innermost statement that is not a null statement, a
    /// declaration, an assignment or an increment.
    pub fn first_unsupported_stmt(&self) -> Option<&'a Stmt> {
        let innermost = self.innermost().as_for()?;
        innermost.body.body_statements().into_iter().find_map(first_unsupported)
    }

    pub fn all_innermost_statements_valid(&self) -> bool {
        self.first_unsupported_stmt().is_none()
    }

    /// The first jump statement anywhere in the loop body.
    pub fn first_jump(&self) -> Option<&'a Stmt> {
        let body = self.stmt.as_for()?.body;
        first_jump(body)
    }

    /// True when the body assigns or increments the loop variable.
    pub fn writes_index_variable(&self) -> bool {
        let (Some(index), Some(for_loop)) = (self.index_variable(), self.stmt.as_for()) else {
            return false;
        };
        collect_exprs(for_loop.body).into_iter().any(|e| {
            crate::analysis::constant::written_identifier(e).and_then(Expr::as_identifier) == Some(index)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parse;

    fn with_first_loop(source: &str, check: impl FnOnce(&LoopInspector)) {
        let unit = parse(source).unwrap();
        let ctx = RefactoringContext::new(&unit);
        let stmt = ctx.index().for_loops()[0];
        let inspector = LoopInspector::new(&ctx, stmt).unwrap();
        check(&inspector);
    }

    #[test]
    fn test_counted_loop_facts() {
        with_first_loop("void f() { for (int i = 2; i < 10; i += 2) ; }", |l| {
            assert!(l.is_counted_loop());
            assert_eq!(l.index_variable(), Some("i"));
            assert_eq!(l.lower_bound(), Some(2));
            assert_eq!(l.inclusive_upper_bound(), Some(9));
            assert_eq!(l.iteration_factor(), Some(2));
        });
        with_first_loop("void f(int n) { for (i = 0; i <= n; i++) ; }", |l| {
            assert!(l.is_counted_loop());
            assert_eq!(l.inclusive_upper_bound(), None);
            assert_eq!(l.iteration_factor(), Some(1));
        });
        with_first_loop("void f() { for (i = 0; i != 8; i++) ; }", |l| {
            assert!(!l.is_counted_loop());
            assert_eq!(l.index_variable(), Some("i"));
        });
    }

    #[test]
    fn test_perfect_nest() {
        let source = "void f() { for (i = 0; i < 4; i++) { for (j = 0; j < 4; j++) for (k = 0; k < 4; k++) a[i] = 0; } }";
        with_first_loop(source, |l| {
            assert!(l.is_perfect_loop_nest());
            assert!(l.is_perfect_loop_nest_to(2));
            assert!(!l.is_perfect_loop_nest_to(3));
            assert_eq!(l.perfect_loop_nest_headers().len(), 3);
            assert!(l.all_innermost_statements_valid());
        });
    }

    #[test]
    fn test_imperfect_nest() {
        let source = "void f() { for (i = 0; i < 4; i++) { x = 1; for (j = 0; j < 4; j++) a[j] = 0; } }";
        with_first_loop(source, |l| {
            assert!(!l.is_perfect_loop_nest());
            assert!(!l.is_perfect_loop_nest_to(1));
            assert_eq!(l.perfect_loop_nest_headers().len(), 1);
            assert!(l.first_unsupported_stmt().map(|s| s.is_for()).unwrap_or(false));
        });
        with_first_loop("void f() { for (i = 0; i < 4; i++) x = 1; }", |l| {
            assert!(l.is_perfect_loop_nest());
            assert!(!l.is_perfect_loop_nest_to(1));
        });
    }

    #[test]
    fn test_pragmas_do_not_break_nesting() {
        let source = "void f() { for (i = 0; i < 4; i++) {\n#pragma unroll\nfor (j = 0; j < 4; j++) a[j] = 0; } }";
        with_first_loop(source, |l| assert!(l.is_perfect_loop_nest_to(1)));
    }

    #[test]
    fn test_innermost_statement_validity_and_jumps() {
        with_first_loop("void f() { for (i = 0; i < 4; i++) { int t = i; a[i] = t; i++; ; } }", |l| {
            assert!(l.all_innermost_statements_valid());
            assert!(l.writes_index_variable());
        });
        with_first_loop("void f() { for (i = 0; i < 4; i++) { a[i] = 0; g(i); } }", |l| {
            assert!(!l.all_innermost_statements_valid());
        });
        with_first_loop("void f() { for (i = 0; i < 4; i++) { if (a[i]) break; } }", |l| {
            assert!(l.first_jump().is_some());
            assert!(!l.writes_index_variable());
        });
    }

    #[test]
    fn test_iteration_factor_at_depth() {
        let source = "void f() { for (i = 0; i < 8; i++) for (j = 0; j < 8; j = j + 4) a[j] = 0; }";
        with_first_loop(source, |l| {
            assert_eq!(l.iteration_factor_at(0), Some(1));
            assert_eq!(l.iteration_factor_at(1), Some(4));
            assert_eq!(l.iteration_factor_at(2), None);
        });
    }

    #[test]
    fn test_headers_are_cached_per_request() {
        let unit = parse("void f() { for (i = 0; i < 4; i++) for (j = 0; j < 4; j++) ; }").unwrap();
        let ctx = RefactoringContext::new(&unit);
        let outer = ctx.index().for_loops()[0];
        let inspector = LoopInspector::new(&ctx, outer).unwrap();
        let _ = inspector.iteration_factor_at(1);
        let _ = LoopInspector::new(&ctx, outer).unwrap();
        assert_eq!(ctx.loops().len(), 2);
    }
}
