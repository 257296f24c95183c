//! Abstract Syntax Tree (AST) for the C subset.
//!
//! Every statement and expression carries a unique [`NodeId`] and a [`Span`]
//! with byte offsets into the original buffer, so analyses can reproduce the
//! raw text of any subtree and the rewrite layer can splice text back in.
//! Assignments are binary expressions, as in C.

use crate::utils::location::{SourceMap, Span};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A node ID for unique identification of AST nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Create a new node ID.
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A parsed source file together with its text.
#[derive(Debug, Clone)]
pub struct TranslationUnit {
    /// Function definitions, in source order
    pub functions: Vec<Function>,
    /// File-scope declarations
    pub globals: Vec<Declaration>,
    /// The original text
    pub source: SourceMap,
}

impl TranslationUnit {
    /// Find a function by name.
    pub fn find_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Raw source text of a span.
    pub fn text(&self, span: &Span) -> &str {
        self.source.span_text(span)
    }
}

/// A function definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub id: NodeId,
    /// Function name
    pub name: String,
    /// Return type as written
    pub return_type: String,
    /// Parameters; each declaration holds exactly one declarator
    pub params: Vec<Declaration>,
    /// Function body (always a compound statement)
    pub body: Stmt,
    /// Source span
    pub span: Span,
}

/// A declaration: specifiers followed by one or more declarators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Declaration {
    /// Type specifiers and qualifiers as written, e.g. `unsigned long`
    pub specifiers: String,
    pub declarators: Vec<Declarator>,
    pub span: Span,
}

/// One declared name with its pointer/array shape and initializer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Declarator {
    pub id: NodeId,
    pub name: String,
    /// Number of leading `*`
    pub pointer_depth: usize,
    /// Array dimensions; `None` for `[]`
    pub array_dims: Vec<Option<Expr>>,
    pub init: Option<Expr>,
    pub span: Span,
}

/// A statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stmt {
    pub id: NodeId,
    /// The kind of statement
    pub kind: StmtKind,
    /// Source span
    pub span: Span,
}

/// The kind of a statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StmtKind {
    /// Block statement: `{ stmts }`
    Compound(Vec<Stmt>),

    /// For loop: `for (init; cond; iter) body`
    ///
    /// `init` is either a declaration or an expression statement.
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        iter: Option<Expr>,
        body: Box<Stmt>,
        /// From `for` through the closing parenthesis
        header_span: Span,
    },

    /// While loop: `while (cond) body`
    While { cond: Expr, body: Box<Stmt> },

    /// Do loop: `do body while (cond);`
    DoWhile { body: Box<Stmt>, cond: Expr },

    /// If statement
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },

    /// Switch statement
    Switch { cond: Expr, body: Box<Stmt> },

    /// `case value: stmt`
    Case { value: Expr, stmt: Box<Stmt> },

    /// `default: stmt`
    Default(Box<Stmt>),

    /// Return statement
    Return(Option<Expr>),

    Break,
    Continue,
    Goto(String),

    /// `label: stmt`
    Label { name: String, stmt: Box<Stmt> },

    /// Expression statement: `expr;`
    Expr(Expr),

    /// Empty statement (just a semicolon)
    Null,

    /// Local declaration
    Decl(Declaration),

    /// `#pragma ...` line, stored verbatim
    Pragma(String),
}

/// Borrowed view of the parts of a `for` statement.
#[derive(Debug, Clone, Copy)]
pub struct ForLoop<'a> {
    pub init: Option<&'a Stmt>,
    pub cond: Option<&'a Expr>,
    pub iter: Option<&'a Expr>,
    pub body: &'a Stmt,
    pub header_span: Span,
}

impl Stmt {
    /// Create a new statement.
    pub fn new(id: NodeId, kind: StmtKind, span: Span) -> Self {
        Self { id, kind, span }
    }

    /// View this statement as a `for` loop.
    pub fn as_for(&self) -> Option<ForLoop<'_>> {
        match &self.kind {
            StmtKind::For { init, cond, iter, body, header_span } => Some(ForLoop {
                init: init.as_deref(),
                cond: cond.as_ref(),
                iter: iter.as_ref(),
                body,
                header_span: *header_span,
            }),
            _ => None,
        }
    }

    pub fn is_for(&self) -> bool {
        matches!(self.kind, StmtKind::For { .. })
    }

    pub fn is_pragma(&self) -> bool {
        matches!(self.kind, StmtKind::Pragma(_))
    }

    /// Statements directly contained in this one, in source order.
    pub fn children(&self) -> Vec<&Stmt> {
        match &self.kind {
            StmtKind::Compound(stmts) => stmts.iter().collect(),
            StmtKind::For { init, body, .. } => init.iter().map(|s| &**s).chain(std::iter::once(&**body)).collect(),
            StmtKind::While { body, .. }
            | StmtKind::DoWhile { body, .. }
            | StmtKind::Switch { body, .. } => vec![&**body],
            StmtKind::If { then_branch, else_branch, .. } => {
                std::iter::once(&**then_branch).chain(else_branch.as_deref()).collect()
            }
            StmtKind::Case { stmt, .. } | StmtKind::Label { stmt, .. } | StmtKind::Default(stmt) => vec![&**stmt],
            _ => Vec::new(),
        }
    }

    /// The statements a loop body consists of, with pragmas dropped.
    ///
    /// A compound body yields its children; any other body yields itself.
    pub fn body_statements(&self) -> Vec<&Stmt> {
        match &self.kind {
            StmtKind::Compound(stmts) => stmts.iter().filter(|s| !s.is_pragma()).collect(),
            _ if self.is_pragma() => Vec::new(),
            _ => vec![self],
        }
    }
}

/// An expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    pub id: NodeId,
    /// The kind of expression
    pub kind: ExprKind,
    /// Source span
    pub span: Span,
}

impl Expr {
    /// Create a new expression.
    pub fn new(id: NodeId, kind: ExprKind, span: Span) -> Self {
        Self { id, kind, span }
    }

    /// Strip any number of enclosing parentheses.
    pub fn unparen(&self) -> &Expr {
        match &self.kind {
            ExprKind::Paren(inner) => inner.unparen(),
            _ => self,
        }
    }

    /// The identifier name, if this is a bare identifier.
    pub fn as_identifier(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Identifier(name) => Some(name),
            _ => None,
        }
    }

    /// The literal value, if this is an integer literal.
    pub fn as_int_literal(&self) -> Option<i64> {
        match self.kind {
            ExprKind::IntLiteral(value) => Some(value),
            _ => None,
        }
    }

    /// Split an assignment into `(op, lhs, rhs)`.
    pub fn as_assignment(&self) -> Option<(BinaryOp, &Expr, &Expr)> {
        match &self.kind {
            ExprKind::Binary { op, left, right } if op.is_assignment() => Some((*op, &**left, &**right)),
            _ => None,
        }
    }

    /// For `A[i][j]`, the base expression and the subscripts outermost first.
    pub fn as_array_access(&self) -> Option<(&Expr, Vec<&Expr>)> {
        let mut indices = Vec::new();
        let mut current = self;
        while let ExprKind::Subscript { array, index } = &current.kind {
            indices.push(&**index);
            current = &**array;
        }
        if indices.is_empty() {
            return None;
        }
        indices.reverse();
        Some((current, indices))
    }

    /// Direct subexpressions, in source order.
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Subscript { array, index } => vec![&**array, &**index],
            ExprKind::Binary { left, right, .. } => vec![&**left, &**right],
            ExprKind::Unary { operand, .. } => vec![&**operand],
            ExprKind::Call { callee, args } => std::iter::once(&**callee).chain(args.iter()).collect(),
            ExprKind::Member { base, .. } => vec![&**base],
            ExprKind::Paren(inner) => vec![&**inner],
            ExprKind::Cast { expr, .. } => vec![&**expr],
            ExprKind::Conditional { cond, then_expr, else_expr } => {
                vec![&**cond, &**then_expr, &**else_expr]
            }
            _ => Vec::new(),
        }
    }

    /// Pre-order walk over this expression and all subexpressions.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }
}

/// The kind of an expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprKind {
    /// Integer literal
    IntLiteral(i64),
    /// Floating-point literal
    FloatLiteral(f64),
    /// Character literal, as written
    CharLiteral(String),
    /// String literal, as written
    StringLiteral(String),

    /// Variable reference
    Identifier(String),

    /// Array subscript: `array[index]`
    Subscript { array: Box<Expr>, index: Box<Expr> },

    /// Binary operation, including assignment and comma
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Unary operation, including increment/decrement
    Unary { op: UnaryOp, operand: Box<Expr> },

    /// Function call
    Call { callee: Box<Expr>, args: Vec<Expr> },

    /// `base.field` or `base->field`
    Member { base: Box<Expr>, field: String, arrow: bool },

    /// Grouped expression (parenthesized)
    Paren(Box<Expr>),

    /// Cast: `(type) expr`
    Cast { ty: String, expr: Box<Expr> },

    /// `sizeof(type)`
    SizeofType(String),

    /// Ternary conditional: `cond ? then : else`
    Conditional {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // Shifts and bitwise
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,

    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // Logical
    And,
    Or,

    // Assignment
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    ShlAssign,
    ShrAssign,
    AndAssign,
    OrAssign,
    XorAssign,

    Comma,
}

impl BinaryOp {
    /// Check if this is `=` or a compound assignment.
    pub fn is_assignment(&self) -> bool {
        use BinaryOp::*;
        matches!(
            self,
            Assign | AddAssign | SubAssign | MulAssign | DivAssign | ModAssign |
            ShlAssign | ShrAssign | AndAssign | OrAssign | XorAssign
        )
    }

    /// Check if this is a comparison operator.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    /// The comparison that holds with the operands swapped.
    pub fn mirrored(&self) -> BinaryOp {
        match self {
            BinaryOp::Lt => BinaryOp::Gt,
            BinaryOp::Le => BinaryOp::Ge,
            BinaryOp::Gt => BinaryOp::Lt,
            BinaryOp::Ge => BinaryOp::Le,
            op => *op,
        }
    }

    pub fn as_str(&self) -> &'static str {
        use BinaryOp::*;
        match self {
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Mod => "%",
            Shl => "<<",
            Shr => ">>",
            BitAnd => "&",
            BitOr => "|",
            BitXor => "^",
            Eq => "==",
            Ne => "!=",
            Lt => "<",
            Le => "<=",
            Gt => ">",
            Ge => ">=",
            And => "&&",
            Or => "||",
            Assign => "=",
            AddAssign => "+=",
            SubAssign => "-=",
            MulAssign => "*=",
            DivAssign => "/=",
            ModAssign => "%=",
            ShlAssign => "<<=",
            ShrAssign => ">>=",
            AndAssign => "&=",
            OrAssign => "|=",
            XorAssign => "^=",
            Comma => ",",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Negation: `-x`
    Neg,
    /// `+x`
    Plus,
    /// Logical not: `!x`
    Not,
    /// `~x`
    BitNot,
    /// `*p`
    Deref,
    /// `&x`
    AddrOf,
    /// `sizeof expr`
    Sizeof,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

impl UnaryOp {
    /// Check if this is `++` or `--` in either position.
    pub fn is_increment(&self) -> bool {
        matches!(self, UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec)
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
            UnaryOp::Deref => "*",
            UnaryOp::AddrOf => "&",
            UnaryOp::Sizeof => "sizeof",
            UnaryOp::PreInc | UnaryOp::PostInc => "++",
            UnaryOp::PreDec | UnaryOp::PostDec => "--",
        };
        write!(f, "{}", s)
    }
}

/// Visitor trait for traversing the AST.
pub trait AstVisitor {
    /// Visit a translation unit.
    fn visit_unit(&mut self, unit: &TranslationUnit) {
        walk_unit(self, unit);
    }

    /// Visit a function.
    fn visit_function(&mut self, func: &Function) {
        for param in &func.params {
            self.visit_declaration(param);
        }
        self.visit_stmt(&func.body);
    }

    /// Visit a declaration.
    fn visit_declaration(&mut self, decl: &Declaration) {
        for declarator in &decl.declarators {
            self.visit_declarator(declarator);
        }
    }

    /// Visit a declarator.
    fn visit_declarator(&mut self, declarator: &Declarator) {
        for dim in declarator.array_dims.iter().flatten() {
            self.visit_expr(dim);
        }
        if let Some(init) = &declarator.init {
            self.visit_expr(init);
        }
    }

    /// Visit a statement.
    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt);
    }

    /// Visit an expression.
    fn visit_expr(&mut self, expr: &Expr) {
        for child in expr.children() {
            self.visit_expr(child);
        }
    }
}

/// Default traversal of a translation unit.
pub fn walk_unit<V: AstVisitor + ?Sized>(visitor: &mut V, unit: &TranslationUnit) {
    for global in &unit.globals {
        visitor.visit_declaration(global);
    }
    for func in &unit.functions {
        visitor.visit_function(func);
    }
}

/// Default traversal of a statement's children.
pub fn walk_stmt<V: AstVisitor + ?Sized>(visitor: &mut V, stmt: &Stmt) {
    match &stmt.kind {
        StmtKind::Compound(stmts) => {
            for s in stmts {
                visitor.visit_stmt(s);
            }
        }
        StmtKind::For { init, cond, iter, body, .. } => {
            if let Some(init) = init {
                visitor.visit_stmt(init);
            }
            if let Some(cond) = cond {
                visitor.visit_expr(cond);
            }
            if let Some(iter) = iter {
                visitor.visit_expr(iter);
            }
            visitor.visit_stmt(body);
        }
        StmtKind::While { cond, body } | StmtKind::Switch { cond, body } => {
            visitor.visit_expr(cond);
            visitor.visit_stmt(body);
        }
        StmtKind::DoWhile { body, cond } => {
            visitor.visit_stmt(body);
            visitor.visit_expr(cond);
        }
        StmtKind::If { cond, then_branch, else_branch } => {
            visitor.visit_expr(cond);
            visitor.visit_stmt(then_branch);
            if let Some(else_branch) = else_branch {
                visitor.visit_stmt(else_branch);
            }
        }
        StmtKind::Case { value, stmt } => {
            visitor.visit_expr(value);
            visitor.visit_stmt(stmt);
        }
        StmtKind::Default(stmt) | StmtKind::Label { stmt, .. } => visitor.visit_stmt(stmt),
        StmtKind::Return(Some(expr)) | StmtKind::Expr(expr) => visitor.visit_expr(expr),
        StmtKind::Decl(decl) => visitor.visit_declaration(decl),
        StmtKind::Return(None)
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Goto(_)
        | StmtKind::Null
        | StmtKind::Pragma(_) => {}
    }
}

/// Pre-order list of every statement under (and including) `stmt`.
pub fn collect_stmts(stmt: &Stmt) -> Vec<&Stmt> {
    let mut out = Vec::new();
    let mut stack = vec![stmt];
    while let Some(s) = stack.pop() {
        out.push(s);
        let children = s.children();
        stack.extend(children.into_iter().rev());
    }
    out
}

/// Pre-order list of every expression under `stmt`, including `for`
/// headers, conditions and declarator initializers.
pub fn collect_exprs(stmt: &Stmt) -> Vec<&Expr> {
    let mut out = Vec::new();
    for s in collect_stmts(stmt) {
        for root in own_exprs(s) {
            root.walk(&mut |e| out.push(e));
        }
    }
    out
}

/// Expressions that belong to `stmt` itself rather than to a nested statement.
pub fn own_exprs(stmt: &Stmt) -> Vec<&Expr> {
    match &stmt.kind {
        StmtKind::For { cond, iter, .. } => cond.iter().chain(iter.iter()).collect(),
        StmtKind::While { cond, .. }
        | StmtKind::DoWhile { cond, .. }
        | StmtKind::Switch { cond, .. }
        | StmtKind::If { cond, .. } => vec![cond],
        StmtKind::Case { value, .. } => vec![value],
        StmtKind::Return(Some(e)) | StmtKind::Expr(e) => vec![e],
        StmtKind::Decl(decl) => decl
            .declarators
            .iter()
            .flat_map(|d| d.array_dims.iter().flatten().chain(d.init.iter()))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> NodeId {
        NodeId::new(n)
    }

    fn ident(n: u32, name: &str) -> Expr {
        Expr::new(id(n), ExprKind::Identifier(name.to_string()), Span::dummy())
    }

    #[test]
    fn test_array_access_unrolls_subscripts() {
        let inner = Expr::new(
            id(3),
            ExprKind::Subscript { array: Box::new(ident(1, "A")), index: Box::new(ident(2, "i")) },
            Span::dummy(),
        );
        let outer = Expr::new(
            id(5),
            ExprKind::Subscript { array: Box::new(inner), index: Box::new(ident(4, "j")) },
            Span::dummy(),
        );
        let (base, indices) = outer.as_array_access().unwrap();
        assert_eq!(base.as_identifier(), Some("A"));
        let names: Vec<_> = indices.iter().filter_map(|e| e.as_identifier()).collect();
        assert_eq!(names, vec!["i", "j"]);
    }

    #[test]
    fn test_unparen() {
        let e = Expr::new(id(2), ExprKind::Paren(Box::new(Expr::new(
            id(1),
            ExprKind::Paren(Box::new(ident(0, "x"))),
            Span::dummy(),
        ))), Span::dummy());
        assert_eq!(e.unparen().as_identifier(), Some("x"));
    }

    #[test]
    fn test_body_statements_skip_pragmas() {
        let body = Stmt::new(id(9), StmtKind::Compound(vec![
            Stmt::new(id(1), StmtKind::Pragma("#pragma acc loop".into()), Span::dummy()),
            Stmt::new(id(2), StmtKind::Null, Span::dummy()),
        ]), Span::dummy());
        assert_eq!(body.body_statements().len(), 1);
        assert_eq!(collect_stmts(&body).len(), 3);
    }

    #[test]
    fn test_assignment_ops() {
        assert!(BinaryOp::ShlAssign.is_assignment());
        assert!(!BinaryOp::Le.is_assignment());
        assert_eq!(BinaryOp::Lt.mirrored(), BinaryOp::Gt);
        assert!(UnaryOp::PostDec.is_increment());
    }
}
