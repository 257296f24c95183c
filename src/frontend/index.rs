//! Per-request navigation over a parsed translation unit.
//!
//! The AST owns its children but has no back links; [`AstIndex`] records
//! parent links and node lookup so analyses can walk upwards (enclosing
//! function, enclosing compound) and sideways (next sibling).

use crate::frontend::ast::*;
use crate::utils::location::{SourceMap, Span};
use std::collections::HashMap;

/// A borrowed reference to any indexed node.
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Function(&'a Function),
    Stmt(&'a Stmt),
    Expr(&'a Expr),
    Declarator(&'a Declarator),
}

impl<'a> NodeRef<'a> {
    pub fn span(&self) -> Span {
        match self {
            NodeRef::Function(f) => f.span,
            NodeRef::Stmt(s) => s.span,
            NodeRef::Expr(e) => e.span,
            NodeRef::Declarator(d) => d.span,
        }
    }
}

/// Parent links and id lookup for one translation unit.
pub struct AstIndex<'a> {
    unit: &'a TranslationUnit,
    nodes: HashMap<NodeId, NodeRef<'a>>,
    parents: HashMap<NodeId, NodeId>,
}

impl<'a> AstIndex<'a> {
    /// Index every node of `unit`.
    pub fn new(unit: &'a TranslationUnit) -> Self {
        let mut index = Self { unit, nodes: HashMap::new(), parents: HashMap::new() };
        for global in &unit.globals {
            index.add_declaration(global, None);
        }
        for func in &unit.functions {
            index.nodes.insert(func.id, NodeRef::Function(func));
            for param in &func.params {
                index.add_declaration(param, Some(func.id));
            }
            index.add_stmt(&func.body, Some(func.id));
        }
        index
    }

    fn link(&mut self, id: NodeId, parent: Option<NodeId>) {
        if let Some(parent) = parent {
            self.parents.insert(id, parent);
        }
    }

    fn add_declaration(&mut self, decl: &'a Declaration, parent: Option<NodeId>) {
        for declarator in &decl.declarators {
            self.nodes.insert(declarator.id, NodeRef::Declarator(declarator));
            self.link(declarator.id, parent);
            for dim in declarator.array_dims.iter().flatten() {
                self.add_expr(dim, Some(declarator.id));
            }
            if let Some(init) = &declarator.init {
                self.add_expr(init, Some(declarator.id));
            }
        }
    }

    fn add_stmt(&mut self, stmt: &'a Stmt, parent: Option<NodeId>) {
        self.nodes.insert(stmt.id, NodeRef::Stmt(stmt));
        self.link(stmt.id, parent);
        if let StmtKind::Decl(decl) = &stmt.kind {
            self.add_declaration(decl, Some(stmt.id));
        } else {
            for expr in own_exprs(stmt) {
                self.add_expr(expr, Some(stmt.id));
            }
        }
        for child in stmt.children() {
            self.add_stmt(child, Some(stmt.id));
        }
    }

    fn add_expr(&mut self, expr: &'a Expr, parent: Option<NodeId>) {
        self.nodes.insert(expr.id, NodeRef::Expr(expr));
        self.link(expr.id, parent);
        for child in expr.children() {
            self.add_expr(child, Some(expr.id));
        }
    }

    pub fn unit(&self) -> &'a TranslationUnit {
        self.unit
    }

    pub fn source(&self) -> &'a SourceMap {
        &self.unit.source
    }

    /// Raw source text of a span.
    pub fn text(&self, span: &Span) -> &'a str {
        self.unit.source.span_text(span)
    }

    pub fn get(&self, id: NodeId) -> Option<NodeRef<'a>> {
        self.nodes.get(&id).copied()
    }

    pub fn stmt(&self, id: NodeId) -> Option<&'a Stmt> {
        match self.get(id)? {
            NodeRef::Stmt(s) => Some(s),
            _ => None,
        }
    }

    pub fn expr(&self, id: NodeId) -> Option<&'a Expr> {
        match self.get(id)? {
            NodeRef::Expr(e) => Some(e),
            _ => None,
        }
    }

    pub fn declarator(&self, id: NodeId) -> Option<&'a Declarator> {
        match self.get(id)? {
            NodeRef::Declarator(d) => Some(d),
            _ => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parents.get(&id).copied()
    }

    /// The nearest enclosing statement (not counting `id` itself).
    pub fn parent_stmt(&self, id: NodeId) -> Option<&'a Stmt> {
        let mut current = self.parent(id)?;
        loop {
            if let Some(stmt) = self.stmt(current) {
                return Some(stmt);
            }
            current = self.parent(current)?;
        }
    }

    /// The function whose body contains `id`.
    pub fn enclosing_function(&self, id: NodeId) -> Option<&'a Function> {
        let mut current = id;
        loop {
            if let Some(NodeRef::Function(f)) = self.get(current) {
                return Some(f);
            }
            current = self.parent(current)?;
        }
    }

    /// True when `id` lies inside (or is) the statement `ancestor`.
    pub fn is_within(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    /// Siblings of `stmt` in its enclosing compound, and its position there.
    fn siblings(&self, stmt: &Stmt) -> Option<(&'a [Stmt], usize)> {
        let parent = self.parent_stmt(stmt.id)?;
        match &parent.kind {
            StmtKind::Compound(stmts) => {
                let position = stmts.iter().position(|s| s.id == stmt.id)?;
                Some((stmts.as_slice(), position))
            }
            _ => None,
        }
    }

    /// The statement following `stmt` in the same compound.
    pub fn next_sibling(&self, stmt: &Stmt) -> Option<&'a Stmt> {
        let (stmts, position) = self.siblings(stmt)?;
        stmts.get(position + 1)
    }

    /// Statements after `stmt` in the same compound.
    pub fn following_siblings(&self, stmt: &Stmt) -> Vec<&'a Stmt> {
        match self.siblings(stmt) {
            Some((stmts, position)) => stmts[position + 1..].iter().collect(),
            None => Vec::new(),
        }
    }

    /// The run of pragma statements immediately preceding `stmt`, in order.
    pub fn pragmas_before(&self, stmt: &Stmt) -> Vec<&'a Stmt> {
        let Some((stmts, position)) = self.siblings(stmt) else {
            return Vec::new();
        };
        let first = stmts[..position]
            .iter()
            .rposition(|s| !s.is_pragma())
            .map(|p| p + 1)
            .unwrap_or(0);
        stmts[first..position].iter().collect()
    }

    /// Every `for` statement in the unit, in source order.
    pub fn for_loops(&self) -> Vec<&'a Stmt> {
        self.unit
            .functions
            .iter()
            .flat_map(|f| collect_stmts(&f.body))
            .filter(|s| s.is_for())
            .collect()
    }

    /// The outermost `for` statement whose header starts on `line`.
    pub fn for_loop_at_line(&self, line: usize) -> Option<&'a Stmt> {
        self.for_loops().into_iter().find(|s| s.span.start_line == line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parse;

    const SOURCE: &str = "void f(int n) {\n\
        int a[10];\n\
        #pragma acc parallel loop\n\
        for (int i = 0; i < 10; i++)\n\
          for (int j = 0; j < 10; j++)\n\
            a[i] = j;\n\
        for (int k = 0; k < 10; k++) a[k] = 0;\n\
    }\n";

    #[test]
    fn test_loop_lookup_by_line() {
        let unit = parse(SOURCE).unwrap();
        let index = AstIndex::new(&unit);
        let outer = index.for_loop_at_line(4).unwrap();
        assert!(index.text(&outer.as_for().unwrap().header_span).contains("int i"));
        let inner = index.for_loop_at_line(5).unwrap();
        assert_eq!(index.parent_stmt(inner.id).map(|s| s.id), Some(outer.id));
        assert_eq!(index.for_loops().len(), 3);
    }

    #[test]
    fn test_siblings_and_pragmas() {
        let unit = parse(SOURCE).unwrap();
        let index = AstIndex::new(&unit);
        let outer = index.for_loop_at_line(4).unwrap();
        let pragmas = index.pragmas_before(outer);
        assert_eq!(pragmas.len(), 1);
        let next = index.next_sibling(outer).unwrap();
        assert_eq!(next.span.start_line, 7);
        assert!(index.pragmas_before(next).is_empty());
    }

    #[test]
    fn test_enclosing_function() {
        let unit = parse(SOURCE).unwrap();
        let index = AstIndex::new(&unit);
        let inner = index.for_loop_at_line(5).unwrap();
        assert_eq!(index.enclosing_function(inner.id).unwrap().name, "f");
        let outer = index.for_loop_at_line(4).unwrap();
        assert!(index.is_within(inner.id, outer.id));
        assert!(!index.is_within(outer.id, inner.id));
    }
}
