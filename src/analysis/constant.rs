//! Constant evaluation of integer expressions.
//!
//! Loop bounds are often written with named constants (`const int N = 100;`)
//! rather than literals. The [`ConstantOracle`] answers whether an expression
//! has a known integer value in a given function.

use crate::frontend::ast::*;
use crate::frontend::resolve::{Binding, Bindings};
use std::collections::{HashMap, HashSet};

/// Evaluates expressions to integer constants where possible.
pub trait ConstantOracle {
    /// The value of `expr` inside `scope`, or `None` when unknown.
    fn evaluate(&self, expr: &Expr, scope: Option<&Function>) -> Option<i64>;
}

/// Folds integer arithmetic over literals and over variables whose
/// declaration has a constant initializer and which are never written in
/// the enclosing function. Globals must not be written in any function.
#[derive(Debug, Clone, Default)]
pub struct ConstantPropagator {
    /// Identifier occurrence → binding
    uses: HashMap<NodeId, Binding>,
    /// Initial values of candidate constants
    values: HashMap<Binding, i64>,
    /// Bindings written anywhere inside each function
    written: HashMap<NodeId, HashSet<Binding>>,
    /// File-scope variables
    globals: HashSet<Binding>,
}

impl ConstantPropagator {
    /// Collect candidate constants and write sets for `unit`.
    pub fn new(unit: &TranslationUnit, bindings: &Bindings) -> Self {
        let mut propagator = Self::default();

        for func in &unit.functions {
            let mut written = HashSet::new();
            for expr in collect_exprs(&func.body) {
                if let Some(target) = written_identifier(expr) {
                    if let Some(binding) = bindings.binding_of(target) {
                        written.insert(binding.clone());
                    }
                }
                if let Some(binding) = bindings.binding_of(expr) {
                    propagator.uses.insert(expr.id, binding.clone());
                }
            }
            propagator.written.insert(func.id, written);
        }

        propagator.globals = unit
            .globals
            .iter()
            .flat_map(|decl| decl.declarators.iter().map(Bindings::declared))
            .collect();

        // Declaration order lets later initializers use earlier constants.
        let declarations = unit
            .globals
            .iter()
            .chain(unit.functions.iter().flat_map(|f| {
                collect_stmts(&f.body).into_iter().filter_map(|s| match &s.kind {
                    StmtKind::Decl(decl) => Some(decl),
                    _ => None,
                })
            }));
        for decl in declarations {
            for declarator in &decl.declarators {
                if let Some(init) = &declarator.init {
                    init.walk(&mut |e| {
                        if let Some(binding) = bindings.binding_of(e) {
                            propagator.uses.insert(e.id, binding.clone());
                        }
                    });
                    if declarator.pointer_depth == 0 && declarator.array_dims.is_empty() {
                        if let Some(value) = propagator.fold(init, None) {
                            propagator.values.insert(Bindings::declared(declarator), value);
                        }
                    }
                }
            }
        }

        log::trace!("constant candidates: {}", propagator.values.len());
        propagator
    }

    fn lookup(&self, expr: &Expr, scope: Option<&Function>) -> Option<i64> {
        let binding = self.uses.get(&expr.id)?;
        let value = *self.values.get(binding)?;
        let is_written = match scope {
            Some(func) if !self.globals.contains(binding) => {
                self.written.get(&func.id).map_or(false, |w| w.contains(binding))
            }
            _ => self.written.values().any(|w| w.contains(binding)),
        };
        if is_written {
            None
        } else {
            Some(value)
        }
    }

    fn fold(&self, expr: &Expr, scope: Option<&Function>) -> Option<i64> {
        match &expr.kind {
            ExprKind::IntLiteral(value) => Some(*value),
            ExprKind::Identifier(_) => self.lookup(expr, scope),
            ExprKind::Paren(inner) => self.fold(inner, scope),
            ExprKind::Cast { expr, .. } => self.fold(expr, scope),
            ExprKind::Unary { op, operand } => {
                let value = self.fold(operand, scope)?;
                match op {
                    UnaryOp::Neg => value.checked_neg(),
                    UnaryOp::Plus => Some(value),
                    UnaryOp::BitNot => Some(!value),
                    UnaryOp::Not => Some((value == 0) as i64),
                    _ => None,
                }
            }
            ExprKind::Binary { op, left, right } => {
                let a = self.fold(left, scope)?;
                let b = self.fold(right, scope)?;
                match op {
                    BinaryOp::Add => a.checked_add(b),
                    BinaryOp::Sub => a.checked_sub(b),
                    BinaryOp::Mul => a.checked_mul(b),
                    BinaryOp::Div => a.checked_div(b),
                    BinaryOp::Mod => a.checked_rem(b),
                    BinaryOp::Shl => u32::try_from(b).ok().and_then(|s| a.checked_shl(s)),
                    BinaryOp::Shr => u32::try_from(b).ok().and_then(|s| a.checked_shr(s)),
                    BinaryOp::BitAnd => Some(a & b),
                    BinaryOp::BitOr => Some(a | b),
                    BinaryOp::BitXor => Some(a ^ b),
                    BinaryOp::Eq => Some((a == b) as i64),
                    BinaryOp::Ne => Some((a != b) as i64),
                    BinaryOp::Lt => Some((a < b) as i64),
                    BinaryOp::Le => Some((a <= b) as i64),
                    BinaryOp::Gt => Some((a > b) as i64),
                    BinaryOp::Ge => Some((a >= b) as i64),
                    _ => None,
                }
            }
            ExprKind::Conditional { cond, then_expr, else_expr } => {
                if self.fold(cond, scope)? != 0 {
                    self.fold(then_expr, scope)
                } else {
                    self.fold(else_expr, scope)
                }
            }
            _ => None,
        }
    }
}

impl ConstantOracle for ConstantPropagator {
    fn evaluate(&self, expr: &Expr, scope: Option<&Function>) -> Option<i64> {
        self.fold(expr, scope)
    }
}

/// The variable an expression writes, if it is an assignment or `++`/`--`
/// of a plain identifier (or of an element of an array named by one).
pub fn written_identifier(expr: &Expr) -> Option<&Expr> {
    let target = match &expr.kind {
        ExprKind::Binary { op, left, .. } if op.is_assignment() => left,
        ExprKind::Unary { op, operand } if op.is_increment() => operand,
        _ => return None,
    };
    let target = target.unparen();
    match target.as_array_access() {
        Some((base, _)) => Some(base.unparen()).filter(|b| b.as_identifier().is_some()),
        None => Some(target).filter(|t| t.as_identifier().is_some()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parse;

    fn bound_of_first_loop(source: &str) -> Option<i64> {
        let unit = parse(source).unwrap();
        let bindings = Bindings::resolve(&unit);
        let oracle = ConstantPropagator::new(&unit, &bindings);
        let func = &unit.functions[0];
        let stmt = collect_stmts(&func.body).into_iter().find(|s| s.is_for()).unwrap();
        let cond = stmt.as_for().unwrap().cond.unwrap();
        let ExprKind::Binary { right, .. } = &cond.kind else { panic!("expected comparison") };
        oracle.evaluate(right, Some(func))
    }

    #[test]
    fn test_literal_arithmetic() {
        assert_eq!(bound_of_first_loop("void f() { for (int i = 0; i < 4 * (2 + 1); i++) ; }"), Some(12));
    }

    #[test]
    fn test_named_constants() {
        let source = "const int N = 100; void f() { int M = N / 2; for (int i = 0; i < M - 1; i++) ; }";
        assert_eq!(bound_of_first_loop(source), Some(49));
    }

    #[test]
    fn test_written_variables_are_unknown() {
        let source = "void f() { int n = 10; n++; for (int i = 0; i < n; i++) ; }";
        assert_eq!(bound_of_first_loop(source), None);
        let source = "void f(int n) { for (int i = 0; i < n; i++) ; }";
        assert_eq!(bound_of_first_loop(source), None);
    }

    #[test]
    fn test_global_written_by_another_function_is_unknown() {
        let source = "int n = 8; void f() { for (int i = 0; i < n; i++) ; } void g() { n = 3; }";
        assert_eq!(bound_of_first_loop(source), None);
        let source = "int n = 8; void f() { for (int i = 0; i < n; i++) ; } void g() { int n = 3; n++; }";
        assert_eq!(bound_of_first_loop(source), Some(8));
    }

    #[test]
    fn test_written_identifier() {
        let unit = parse("void f() { a[i] = 1; x += 2; k++; *p = 3; }").unwrap();
        let names: Vec<_> = collect_exprs(&unit.functions[0].body)
            .into_iter()
            .filter_map(written_identifier)
            .filter_map(|e| e.as_identifier())
            .collect();
        assert_eq!(names, vec!["a", "x", "k"]);
    }
}
