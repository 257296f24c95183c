//! Name resolution.
//!
//! Binds every identifier occurrence to the declarator that introduces it,
//! following C block scoping. Two occurrences refer to the same variable
//! exactly when their [`Binding`]s are equal.

use crate::frontend::ast::*;
use std::collections::HashMap;

/// The identity of a variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Binding {
    /// Introduced by the declarator with this id
    Declared(NodeId),
    /// No visible declaration (macro, implicit global, ...); identified by name
    Free(String),
}

/// Identifier occurrence → binding, for one translation unit.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    uses: HashMap<NodeId, Binding>,
    names: HashMap<Binding, String>,
}

impl Bindings {
    /// Resolve every identifier in `unit`.
    pub fn resolve(unit: &TranslationUnit) -> Self {
        let mut resolver = Resolver { scopes: vec![HashMap::new()], bindings: Bindings::default() };
        resolver.visit_unit(unit);
        resolver.bindings
    }

    /// The binding of an identifier expression.
    pub fn binding_of(&self, expr: &Expr) -> Option<&Binding> {
        self.uses.get(&expr.id)
    }

    /// The binding introduced by a declarator.
    pub fn declared(declarator: &Declarator) -> Binding {
        Binding::Declared(declarator.id)
    }

    /// The name a binding was declared with.
    pub fn name_of<'b>(&'b self, binding: &'b Binding) -> &'b str {
        match binding {
            Binding::Free(name) => name,
            Binding::Declared(_) => self.names.get(binding).map(String::as_str).unwrap_or(""),
        }
    }

    /// Every identifier occurrence under `stmt` bound to `binding`.
    pub fn occurrences<'a>(&self, stmt: &'a Stmt, binding: &Binding) -> Vec<&'a Expr> {
        collect_exprs(stmt)
            .into_iter()
            .filter(|e| self.binding_of(e) == Some(binding))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.uses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uses.is_empty()
    }
}

struct Resolver {
    scopes: Vec<HashMap<String, NodeId>>,
    bindings: Bindings,
}

impl Resolver {
    fn with_scope(&mut self, f: impl FnOnce(&mut Self)) {
        self.scopes.push(HashMap::new());
        f(self);
        self.scopes.pop();
    }

    fn declare(&mut self, declarator: &Declarator) {
        if declarator.name.is_empty() {
            return;
        }
        self.bindings
            .names
            .insert(Binding::Declared(declarator.id), declarator.name.clone());
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(declarator.name.clone(), declarator.id);
        }
    }

    fn lookup(&self, name: &str) -> Binding {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .map(|id| Binding::Declared(*id))
            .unwrap_or_else(|| Binding::Free(name.to_string()))
    }
}

impl AstVisitor for Resolver {
    fn visit_function(&mut self, func: &Function) {
        self.with_scope(|r| {
            for param in &func.params {
                r.visit_declaration(param);
            }
            // The body's own compound opens the local scope
            r.visit_stmt(&func.body);
        });
    }

    fn visit_declarator(&mut self, declarator: &Declarator) {
        for dim in declarator.array_dims.iter().flatten() {
            self.visit_expr(dim);
        }
        // The name is in scope within its own initializer
        self.declare(declarator);
        if let Some(init) = &declarator.init {
            self.visit_expr(init);
        }
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Compound(_) | StmtKind::For { .. } => {
                self.with_scope(|r| walk_stmt(r, stmt));
            }
            _ => walk_stmt(self, stmt),
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        if let ExprKind::Identifier(name) = &expr.kind {
            let binding = self.lookup(name);
            self.bindings.uses.insert(expr.id, binding);
        }
        for child in expr.children() {
            self.visit_expr(child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parse;

    fn identifiers<'a>(unit: &'a TranslationUnit, name: &str) -> Vec<&'a Expr> {
        collect_exprs(&unit.functions[0].body)
            .into_iter()
            .filter(|e| e.as_identifier() == Some(name))
            .collect()
    }

    #[test]
    fn test_shadowing_in_nested_blocks() {
        let source = "void f() { int i = 0; i = 1; { int i = 2; i = 3; } for (int i = 0; i < 2; i++) ; }";
        let unit = parse(source).unwrap();
        let bindings = Bindings::resolve(&unit);
        let uses = identifiers(&unit, "i");
        let outer = bindings.binding_of(uses[0]).cloned();
        let block = bindings.binding_of(uses[1]).cloned();
        let for_loop = bindings.binding_of(uses[2]).cloned();
        assert!(outer.is_some());
        assert_ne!(outer, block);
        assert_ne!(outer, for_loop);
        assert_eq!(bindings.binding_of(uses[3]).cloned(), for_loop);
    }

    #[test]
    fn test_free_names_share_identity() {
        let unit = parse("void f() { a[0] = N; b = N; }").unwrap();
        let bindings = Bindings::resolve(&unit);
        let uses = identifiers(&unit, "N");
        assert_eq!(bindings.binding_of(uses[0]), Some(&Binding::Free("N".into())));
        assert_eq!(bindings.binding_of(uses[0]), bindings.binding_of(uses[1]));
    }

    #[test]
    fn test_parameters_and_globals_resolve() {
        let unit = parse("int g; void f(int n) { g = n; }").unwrap();
        let bindings = Bindings::resolve(&unit);
        for name in ["g", "n"] {
            let uses = identifiers(&unit, name);
            let binding = bindings.binding_of(uses[0]).unwrap();
            assert!(matches!(binding, Binding::Declared(_)));
            assert_eq!(bindings.name_of(binding), name);
        }
    }
}
