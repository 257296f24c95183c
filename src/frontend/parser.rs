//! Parser for the C subset.
//!
//! This module implements a recursive descent parser that converts
//! a stream of tokens into an AST. It understands enough of C to handle
//! numerical kernels: function definitions, declarations with pointer and
//! array declarators, every statement form, and the full expression
//! precedence ladder.

use crate::frontend::ast::*;
use crate::frontend::lexer::Lexer;
use crate::frontend::token::{Token, TokenKind};
use crate::utils::errors::ParseError;
use crate::utils::location::{SourceMap, Span};
use std::collections::HashSet;

type PResult<T> = Result<T, ParseError>;

/// Names commonly used as types without a visible `typedef`.
const BUILTIN_TYPEDEFS: &[&str] = &[
    "size_t", "ssize_t", "ptrdiff_t", "int8_t", "int16_t", "int32_t", "int64_t",
    "uint8_t", "uint16_t", "uint32_t", "uint64_t", "intptr_t", "uintptr_t", "bool",
];

/// A parser for C source text.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    next_id: u32,
    typedef_names: HashSet<String>,
}

impl Parser {
    /// Create a new parser from a lexer.
    pub fn new(lexer: Lexer<'_>) -> PResult<Self> {
        let tokens = lexer.tokenize().map_err(|e| ParseError {
            message: e.message.clone(),
            span: e.span,
            found: None,
        })?;
        Ok(Self {
            tokens,
            pos: 0,
            next_id: 0,
            typedef_names: BUILTIN_TYPEDEFS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Parse a complete translation unit.
    pub fn parse_translation_unit(&mut self, source: &str) -> PResult<TranslationUnit> {
        let mut functions = Vec::new();
        let mut globals = Vec::new();
        let mut errors: Vec<ParseError> = Vec::new();

        while !self.is_at_end() {
            match self.parse_external_declaration() {
                Ok(Some(TopLevel::Function(func))) => functions.push(func),
                Ok(Some(TopLevel::Global(decl))) => globals.push(decl),
                Ok(None) => {}
                Err(e) => {
                    log::debug!("parse error: {}", e);
                    errors.push(e);
                    self.synchronize();
                }
            }
        }

        if let Some(first) = errors.into_iter().next() {
            return Err(first);
        }

        Ok(TranslationUnit {
            functions,
            globals,
            source: SourceMap::new(source.to_string()),
        })
    }

    /// Parse exactly one statement followed by end of input.
    pub fn parse_standalone_statement(&mut self) -> PResult<Stmt> {
        let stmt = self.parse_statement()?;
        if !self.is_at_end() {
            return Err(self.error("Expected end of input after statement"));
        }
        Ok(stmt)
    }

    /// Parse exactly one expression followed by end of input.
    pub fn parse_standalone_expression(&mut self) -> PResult<Expr> {
        let expr = self.parse_expression()?;
        if !self.is_at_end() {
            return Err(self.error("Expected end of input after expression"));
        }
        Ok(expr)
    }

    fn fresh_id(&mut self) -> NodeId {
        let id = NodeId::new(self.next_id);
        self.next_id += 1;
        id
    }

    // ---------------------------------------------------------------
    // Top level
    // ---------------------------------------------------------------

    fn parse_external_declaration(&mut self) -> PResult<Option<TopLevel>> {
        if self.check(TokenKind::Pragma) || self.check(TokenKind::Semicolon) {
            self.advance();
            return Ok(None);
        }
        if self.check_identifier("typedef") {
            self.parse_typedef()?;
            return Ok(None);
        }

        let start = self.current().span;
        let specifiers = self.parse_specifiers()?;
        let declarator = self.parse_declarator(false)?;

        if self.check(TokenKind::LeftParen) {
            let params = self.parse_parameter_list()?;
            if self.match_token(TokenKind::Semicolon) {
                // Prototype only
                return Ok(None);
            }
            if !self.check(TokenKind::LeftBrace) {
                return Err(self.error("Expected '{' or ';' after function declarator"));
            }
            let body = self.parse_compound()?;
            let span = start.merge(&body.span);
            let id = self.fresh_id();
            return Ok(Some(TopLevel::Function(Function {
                id,
                name: declarator.name,
                return_type: specifiers,
                params,
                body,
                span,
            })));
        }

        let decl = self.finish_declaration(start, specifiers, declarator)?;
        self.consume(TokenKind::Semicolon, "Expected ';' after declaration")?;
        Ok(Some(TopLevel::Global(decl)))
    }

    fn parse_typedef(&mut self) -> PResult<()> {
        self.advance();
        let mut last_identifier = None;
        let mut depth = 0usize;
        while !self.is_at_end() {
            match self.current().kind {
                TokenKind::LeftBrace => depth += 1,
                TokenKind::RightBrace => depth = depth.saturating_sub(1),
                TokenKind::Semicolon if depth == 0 => break,
                TokenKind::Identifier if depth == 0 => {
                    last_identifier = Some(self.current().lexeme.clone());
                }
                _ => {}
            }
            self.advance();
        }
        self.consume(TokenKind::Semicolon, "Expected ';' after typedef")?;
        if let Some(name) = last_identifier {
            self.typedef_names.insert(name);
        }
        Ok(())
    }

    fn parse_parameter_list(&mut self) -> PResult<Vec<Declaration>> {
        self.consume(TokenKind::LeftParen, "Expected '('")?;
        let mut params = Vec::new();
        if self.check(TokenKind::Void) && self.peek_kind(1) == TokenKind::RightParen {
            self.advance();
        }
        while !self.check(TokenKind::RightParen) {
            if self.check(TokenKind::Dot) {
                // `...`
                while self.match_token(TokenKind::Dot) {}
            } else {
                let start = self.current().span;
                let specifiers = self.parse_specifiers()?;
                let declarator = self.parse_declarator(true)?;
                let span = start.merge(&self.previous().span);
                params.push(Declaration { specifiers, declarators: vec![declarator], span });
            }
            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RightParen, "Expected ')' after parameters")?;
        Ok(params)
    }

    // ---------------------------------------------------------------
    // Declarations
    // ---------------------------------------------------------------

    fn is_type_name(&self, token: &Token) -> bool {
        token.kind.starts_declaration()
            || token.kind == TokenKind::Restrict
            || (token.kind == TokenKind::Identifier && self.typedef_names.contains(&token.lexeme))
    }

    /// True when the current token begins a declaration.
    fn at_declaration_start(&self) -> bool {
        let current = self.current();
        if self.is_type_name(current) {
            return true;
        }
        // `T x`, `T *x =` with an unknown typedef name T
        if current.kind == TokenKind::Identifier {
            match self.peek_kind(1) {
                TokenKind::Identifier => return true,
                TokenKind::Star => {
                    return self.peek_kind(2) == TokenKind::Identifier
                        && matches!(
                            self.peek_kind(3),
                            TokenKind::Equal | TokenKind::Semicolon | TokenKind::Comma | TokenKind::LeftBracket
                        );
                }
                _ => {}
            }
        }
        false
    }

    fn parse_specifiers(&mut self) -> PResult<String> {
        let mut words: Vec<String> = Vec::new();
        loop {
            let token = self.current().clone();
            if token.kind == TokenKind::Struct {
                self.advance();
                let mut word = "struct".to_string();
                if self.check(TokenKind::Identifier) {
                    word.push(' ');
                    word.push_str(&self.current().lexeme);
                    self.advance();
                }
                if self.check(TokenKind::LeftBrace) {
                    self.skip_balanced(TokenKind::LeftBrace, TokenKind::RightBrace)?;
                }
                words.push(word);
            } else if self.is_type_name(&token) {
                words.push(token.lexeme);
                self.advance();
            } else if token.kind == TokenKind::Identifier
                && words.iter().all(|w| is_qualifier(w))
                && matches!(self.peek_kind(1), TokenKind::Identifier | TokenKind::Star)
            {
                // Unknown typedef name
                words.push(token.lexeme);
                self.advance();
            } else {
                break;
            }
        }
        if words.is_empty() {
            return Err(self.error("Expected type specifier"));
        }
        Ok(words.join(" "))
    }

    /// Parse `*... name [dims]...`. The name may be omitted for parameters.
    fn parse_declarator(&mut self, name_optional: bool) -> PResult<Declarator> {
        let start = self.current().span;
        let mut pointer_depth = 0;
        while self.match_token(TokenKind::Star) {
            pointer_depth += 1;
            while matches!(
                self.current().kind,
                TokenKind::Const | TokenKind::Volatile | TokenKind::Restrict
            ) {
                self.advance();
            }
        }

        let name = if self.check(TokenKind::Identifier) {
            let name = self.current().lexeme.clone();
            self.advance();
            name
        } else if name_optional {
            String::new()
        } else {
            return Err(self.error("Expected identifier in declarator"));
        };

        let mut array_dims = Vec::new();
        while self.match_token(TokenKind::LeftBracket) {
            if self.match_token(TokenKind::RightBracket) {
                array_dims.push(None);
            } else {
                let dim = self.parse_assignment()?;
                self.consume(TokenKind::RightBracket, "Expected ']' after array dimension")?;
                array_dims.push(Some(dim));
            }
        }

        let span = start.merge(&self.previous().span);
        let id = self.fresh_id();
        Ok(Declarator { id, name, pointer_depth, array_dims, init: None, span })
    }

    /// Parse the initializer of `first` and any further declarators.
    fn finish_declaration(
        &mut self,
        start: Span,
        specifiers: String,
        first: Declarator,
    ) -> PResult<Declaration> {
        let mut declarators = Vec::new();
        let mut current = first;
        loop {
            if self.match_token(TokenKind::Equal) {
                if self.check(TokenKind::LeftBrace) {
                    // Aggregate initializers carry no loop information
                    self.skip_balanced(TokenKind::LeftBrace, TokenKind::RightBrace)?;
                } else {
                    let init = self.parse_assignment()?;
                    current.span = current.span.merge(&init.span);
                    current.init = Some(init);
                }
            }
            declarators.push(current);
            if !self.match_token(TokenKind::Comma) {
                break;
            }
            current = self.parse_declarator(false)?;
        }
        let span = start.merge(&self.previous().span);
        Ok(Declaration { specifiers, declarators, span })
    }

    fn parse_declaration(&mut self) -> PResult<Declaration> {
        let start = self.current().span;
        let specifiers = self.parse_specifiers()?;
        let first = self.parse_declarator(false)?;
        self.finish_declaration(start, specifiers, first)
    }

    // ---------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------

    fn parse_compound(&mut self) -> PResult<Stmt> {
        let start = self.current().span;
        self.consume(TokenKind::LeftBrace, "Expected '{'")?;
        let mut stmts = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            stmts.push(self.parse_statement()?);
        }
        self.consume(TokenKind::RightBrace, "Expected '}'")?;
        let span = start.merge(&self.previous().span);
        let id = self.fresh_id();
        Ok(Stmt::new(id, StmtKind::Compound(stmts), span))
    }

    fn parse_statement(&mut self) -> PResult<Stmt> {
        let start = self.current().span;
        let kind = match self.current().kind {
            TokenKind::LeftBrace => return self.parse_compound(),
            TokenKind::For => return self.parse_for(),
            TokenKind::Pragma => {
                let text = self.current().lexeme.clone();
                self.advance();
                StmtKind::Pragma(text)
            }
            TokenKind::Semicolon => {
                self.advance();
                StmtKind::Null
            }
            TokenKind::While => {
                self.advance();
                let cond = self.parse_paren_condition()?;
                let body = self.parse_statement()?;
                StmtKind::While { cond, body: Box::new(body) }
            }
            TokenKind::Do => {
                self.advance();
                let body = self.parse_statement()?;
                self.consume(TokenKind::While, "Expected 'while' after do body")?;
                let cond = self.parse_paren_condition()?;
                self.consume(TokenKind::Semicolon, "Expected ';' after do-while")?;
                StmtKind::DoWhile { body: Box::new(body), cond }
            }
            TokenKind::If => {
                self.advance();
                let cond = self.parse_paren_condition()?;
                let then_branch = Box::new(self.parse_statement()?);
                let else_branch = if self.match_token(TokenKind::Else) {
                    Some(Box::new(self.parse_statement()?))
                } else {
                    None
                };
                StmtKind::If { cond, then_branch, else_branch }
            }
            TokenKind::Switch => {
                self.advance();
                let cond = self.parse_paren_condition()?;
                let body = self.parse_statement()?;
                StmtKind::Switch { cond, body: Box::new(body) }
            }
            TokenKind::Case => {
                self.advance();
                let value = self.parse_conditional()?;
                self.consume(TokenKind::Colon, "Expected ':' after case value")?;
                let stmt = self.parse_statement()?;
                StmtKind::Case { value, stmt: Box::new(stmt) }
            }
            TokenKind::Default => {
                self.advance();
                self.consume(TokenKind::Colon, "Expected ':' after default")?;
                StmtKind::Default(Box::new(self.parse_statement()?))
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.check(TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.consume(TokenKind::Semicolon, "Expected ';' after return")?;
                StmtKind::Return(value)
            }
            TokenKind::Break => {
                self.advance();
                self.consume(TokenKind::Semicolon, "Expected ';' after break")?;
                StmtKind::Break
            }
            TokenKind::Continue => {
                self.advance();
                self.consume(TokenKind::Semicolon, "Expected ';' after continue")?;
                StmtKind::Continue
            }
            TokenKind::Goto => {
                self.advance();
                let label = self.consume_identifier("Expected label after goto")?;
                self.consume(TokenKind::Semicolon, "Expected ';' after goto")?;
                StmtKind::Goto(label)
            }
            TokenKind::Identifier if self.peek_kind(1) == TokenKind::Colon => {
                let name = self.current().lexeme.clone();
                self.advance();
                self.advance();
                let stmt = self.parse_statement()?;
                StmtKind::Label { name, stmt: Box::new(stmt) }
            }
            _ if self.at_declaration_start() => {
                let decl = self.parse_declaration()?;
                self.consume(TokenKind::Semicolon, "Expected ';' after declaration")?;
                StmtKind::Decl(decl)
            }
            _ => {
                let expr = self.parse_expression()?;
                self.consume(TokenKind::Semicolon, "Expected ';' after expression")?;
                StmtKind::Expr(expr)
            }
        };
        let span = start.merge(&self.previous().span);
        let id = self.fresh_id();
        Ok(Stmt::new(id, kind, span))
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        let start = self.current().span;
        self.consume(TokenKind::For, "Expected 'for'")?;
        self.consume(TokenKind::LeftParen, "Expected '(' after 'for'")?;

        let init = if self.match_token(TokenKind::Semicolon) {
            None
        } else if self.at_declaration_start() {
            let decl = self.parse_declaration()?;
            let span = decl.span;
            self.consume(TokenKind::Semicolon, "Expected ';' after loop initializer")?;
            let id = self.fresh_id();
            Some(Box::new(Stmt::new(id, StmtKind::Decl(decl), span)))
        } else {
            let expr = self.parse_expression()?;
            let span = expr.span;
            self.consume(TokenKind::Semicolon, "Expected ';' after loop initializer")?;
            let id = self.fresh_id();
            Some(Box::new(Stmt::new(id, StmtKind::Expr(expr), span)))
        };

        let cond = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume(TokenKind::Semicolon, "Expected ';' after loop condition")?;

        let iter = if self.check(TokenKind::RightParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume(TokenKind::RightParen, "Expected ')' after for clauses")?;
        let header_span = start.merge(&self.previous().span);

        let body = self.parse_statement()?;
        let span = start.merge(&body.span);
        let id = self.fresh_id();
        Ok(Stmt::new(
            id,
            StmtKind::For { init, cond, iter, body: Box::new(body), header_span },
            span,
        ))
    }

    fn parse_paren_condition(&mut self) -> PResult<Expr> {
        self.consume(TokenKind::LeftParen, "Expected '('")?;
        let cond = self.parse_expression()?;
        self.consume(TokenKind::RightParen, "Expected ')'")?;
        Ok(cond)
    }

    // ---------------------------------------------------------------
    // Expressions, lowest precedence first
    // ---------------------------------------------------------------

    fn parse_expression(&mut self) -> PResult<Expr> {
        let mut left = self.parse_assignment()?;
        while self.match_token(TokenKind::Comma) {
            let right = self.parse_assignment()?;
            left = self.binary(BinaryOp::Comma, left, right);
        }
        Ok(left)
    }

    fn parse_assignment(&mut self) -> PResult<Expr> {
        let left = self.parse_conditional()?;
        let op = match self.current().kind {
            TokenKind::Equal => BinaryOp::Assign,
            TokenKind::PlusEqual => BinaryOp::AddAssign,
            TokenKind::MinusEqual => BinaryOp::SubAssign,
            TokenKind::StarEqual => BinaryOp::MulAssign,
            TokenKind::SlashEqual => BinaryOp::DivAssign,
            TokenKind::PercentEqual => BinaryOp::ModAssign,
            TokenKind::ShlEqual => BinaryOp::ShlAssign,
            TokenKind::ShrEqual => BinaryOp::ShrAssign,
            TokenKind::AmpEqual => BinaryOp::AndAssign,
            TokenKind::PipeEqual => BinaryOp::OrAssign,
            TokenKind::CaretEqual => BinaryOp::XorAssign,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_assignment()?;
        Ok(self.binary(op, left, right))
    }

    fn parse_conditional(&mut self) -> PResult<Expr> {
        let cond = self.parse_binary(0)?;
        if !self.match_token(TokenKind::Question) {
            return Ok(cond);
        }
        let then_expr = self.parse_expression()?;
        self.consume(TokenKind::Colon, "Expected ':' in conditional expression")?;
        let else_expr = self.parse_conditional()?;
        let span = cond.span.merge(&else_expr.span);
        let id = self.fresh_id();
        Ok(Expr::new(
            id,
            ExprKind::Conditional {
                cond: Box::new(cond),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            span,
        ))
    }

    /// Precedence climbing over the left-associative binary levels.
    fn parse_binary(&mut self, min_level: u8) -> PResult<Expr> {
        let mut left = self.parse_unary()?;
        while let Some((op, level)) = binary_operator(self.current().kind) {
            if level < min_level {
                break;
            }
            self.advance();
            let right = self.parse_binary(level + 1)?;
            left = self.binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let start = self.current().span;
        let op = match self.current().kind {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::Star => Some(UnaryOp::Deref),
            TokenKind::Amp => Some(UnaryOp::AddrOf),
            TokenKind::PlusPlus => Some(UnaryOp::PreInc),
            TokenKind::MinusMinus => Some(UnaryOp::PreDec),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            let span = start.merge(&operand.span);
            let id = self.fresh_id();
            return Ok(Expr::new(id, ExprKind::Unary { op, operand: Box::new(operand) }, span));
        }

        if self.check(TokenKind::Sizeof) {
            self.advance();
            if self.check(TokenKind::LeftParen) && self.is_type_name(self.peek(1)) {
                self.advance();
                let ty = self.parse_type_name()?;
                self.consume(TokenKind::RightParen, "Expected ')' after sizeof type")?;
                let span = start.merge(&self.previous().span);
                let id = self.fresh_id();
                return Ok(Expr::new(id, ExprKind::SizeofType(ty), span));
            }
            let operand = self.parse_unary()?;
            let span = start.merge(&operand.span);
            let id = self.fresh_id();
            return Ok(Expr::new(
                id,
                ExprKind::Unary { op: UnaryOp::Sizeof, operand: Box::new(operand) },
                span,
            ));
        }

        // Cast: `(type) expr`
        if self.check(TokenKind::LeftParen) && self.is_type_name(self.peek(1)) {
            self.advance();
            let ty = self.parse_type_name()?;
            self.consume(TokenKind::RightParen, "Expected ')' after cast type")?;
            let expr = self.parse_unary()?;
            let span = start.merge(&expr.span);
            let id = self.fresh_id();
            return Ok(Expr::new(id, ExprKind::Cast { ty, expr: Box::new(expr) }, span));
        }

        self.parse_postfix()
    }

    fn parse_type_name(&mut self) -> PResult<String> {
        let mut ty = self.parse_specifiers()?;
        while self.match_token(TokenKind::Star) {
            ty.push('*');
        }
        Ok(ty)
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.current().kind {
                TokenKind::LeftBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.consume(TokenKind::RightBracket, "Expected ']'")?;
                    let span = expr.span.merge(&self.previous().span);
                    let id = self.fresh_id();
                    expr = Expr::new(
                        id,
                        ExprKind::Subscript { array: Box::new(expr), index: Box::new(index) },
                        span,
                    );
                }
                TokenKind::LeftParen => {
                    self.advance();
                    let mut args = Vec::new();
                    if !self.check(TokenKind::RightParen) {
                        loop {
                            args.push(self.parse_assignment()?);
                            if !self.match_token(TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.consume(TokenKind::RightParen, "Expected ')' after arguments")?;
                    let span = expr.span.merge(&self.previous().span);
                    let id = self.fresh_id();
                    expr = Expr::new(id, ExprKind::Call { callee: Box::new(expr), args }, span);
                }
                TokenKind::Dot | TokenKind::Arrow => {
                    let arrow = self.check(TokenKind::Arrow);
                    self.advance();
                    let field = self.consume_identifier("Expected field name")?;
                    let span = expr.span.merge(&self.previous().span);
                    let id = self.fresh_id();
                    expr = Expr::new(id, ExprKind::Member { base: Box::new(expr), field, arrow }, span);
                }
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    let op = if self.check(TokenKind::PlusPlus) { UnaryOp::PostInc } else { UnaryOp::PostDec };
                    self.advance();
                    let span = expr.span.merge(&self.previous().span);
                    let id = self.fresh_id();
                    expr = Expr::new(id, ExprKind::Unary { op, operand: Box::new(expr) }, span);
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let token = self.current().clone();
        let kind = match token.kind {
            TokenKind::Integer => ExprKind::IntLiteral(parse_int_literal(&token.lexeme).ok_or_else(
                || self.error("Invalid integer literal"),
            )?),
            TokenKind::Float => {
                let digits = token.lexeme.trim_end_matches(['f', 'F', 'l', 'L']);
                ExprKind::FloatLiteral(digits.parse().map_err(|_| self.error("Invalid float literal"))?)
            }
            TokenKind::Char => ExprKind::CharLiteral(token.lexeme.clone()),
            TokenKind::String => ExprKind::StringLiteral(token.lexeme.clone()),
            TokenKind::Identifier => ExprKind::Identifier(token.lexeme.clone()),
            TokenKind::LeftParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.consume(TokenKind::RightParen, "Expected ')'")?;
                let span = token.span.merge(&self.previous().span);
                let id = self.fresh_id();
                return Ok(Expr::new(id, ExprKind::Paren(Box::new(inner)), span));
            }
            _ => return Err(self.error("Expected expression")),
        };
        self.advance();
        let id = self.fresh_id();
        Ok(Expr::new(id, kind, token.span))
    }

    fn binary(&mut self, op: BinaryOp, left: Expr, right: Expr) -> Expr {
        let span = left.span.merge(&right.span);
        let id = self.fresh_id();
        Expr::new(id, ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, span)
    }

    // ---------------------------------------------------------------
    // Helper methods
    // ---------------------------------------------------------------

    fn current(&self) -> &Token {
        self.peek(0)
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1).min(self.tokens.len() - 1)]
    }

    /// Token `n` positions ahead; sticks at the trailing EOF.
    fn peek(&self, n: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + n).min(last)]
    }

    fn peek_kind(&self, n: usize) -> TokenKind {
        self.peek(n).kind
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn check_identifier(&self, name: &str) -> bool {
        self.check(TokenKind::Identifier) && self.current().lexeme == name
    }

    fn is_at_end(&self) -> bool {
        self.check(TokenKind::Eof)
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.pos += 1;
        }
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> PResult<()> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&format!("{}: expected '{}'", message, kind)))
        }
    }

    fn consume_identifier(&mut self, message: &str) -> PResult<String> {
        if self.check(TokenKind::Identifier) {
            let name = self.current().lexeme.clone();
            self.advance();
            Ok(name)
        } else {
            Err(self.error(message))
        }
    }

    fn skip_balanced(&mut self, open: TokenKind, close: TokenKind) -> PResult<()> {
        self.consume(open, "Expected opening delimiter")?;
        let mut depth = 1usize;
        while depth > 0 {
            if self.is_at_end() {
                return Err(self.error("Unbalanced delimiters"));
            }
            let kind = self.current().kind;
            if kind == open {
                depth += 1;
            } else if kind == close {
                depth -= 1;
            }
            self.advance();
        }
        Ok(())
    }

    fn error(&self, message: &str) -> ParseError {
        let current = self.current();
        ParseError {
            message: message.to_string(),
            span: current.span,
            found: Some(current.kind.name().to_string()),
        }
    }

    fn synchronize(&mut self) {
        // Always advance at least once to avoid infinite loops
        self.advance();
        let mut depth = 0usize;
        while !self.is_at_end() {
            match self.previous().kind {
                TokenKind::LeftBrace => depth += 1,
                TokenKind::RightBrace if depth <= 1 => return,
                TokenKind::RightBrace => depth -= 1,
                TokenKind::Semicolon if depth == 0 => return,
                _ => {}
            }
            self.advance();
        }
    }
}

enum TopLevel {
    Function(Function),
    Global(Declaration),
}

fn is_qualifier(word: &str) -> bool {
    matches!(
        word,
        "const" | "volatile" | "static" | "extern" | "register" | "restrict" | "inline"
    )
}

/// Binary operator and precedence level (higher binds tighter).
fn binary_operator(kind: TokenKind) -> Option<(BinaryOp, u8)> {
    let entry = match kind {
        TokenKind::PipePipe => (BinaryOp::Or, 1),
        TokenKind::AmpAmp => (BinaryOp::And, 2),
        TokenKind::Pipe => (BinaryOp::BitOr, 3),
        TokenKind::Caret => (BinaryOp::BitXor, 4),
        TokenKind::Amp => (BinaryOp::BitAnd, 5),
        TokenKind::EqualEqual => (BinaryOp::Eq, 6),
        TokenKind::BangEqual => (BinaryOp::Ne, 6),
        TokenKind::Less => (BinaryOp::Lt, 7),
        TokenKind::LessEqual => (BinaryOp::Le, 7),
        TokenKind::Greater => (BinaryOp::Gt, 7),
        TokenKind::GreaterEqual => (BinaryOp::Ge, 7),
        TokenKind::Shl => (BinaryOp::Shl, 8),
        TokenKind::Shr => (BinaryOp::Shr, 8),
        TokenKind::Plus => (BinaryOp::Add, 9),
        TokenKind::Minus => (BinaryOp::Sub, 9),
        TokenKind::Star => (BinaryOp::Mul, 10),
        TokenKind::Slash => (BinaryOp::Div, 10),
        TokenKind::Percent => (BinaryOp::Mod, 10),
        _ => return None,
    };
    Some(entry)
}

/// Parse a C integer literal (decimal, hex or octal, any `u`/`l` suffix).
pub fn parse_int_literal(lexeme: &str) -> Option<i64> {
    let digits = lexeme.trim_end_matches(['u', 'U', 'l', 'L']);
    let value = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()?
    } else if digits.len() > 1 && digits.starts_with('0') {
        u64::from_str_radix(&digits[1..], 8).ok()?
    } else {
        digits.parse::<u64>().ok()?
    };
    i64::try_from(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> PResult<TranslationUnit> {
        let mut parser = Parser::new(Lexer::new(source))?;
        parser.parse_translation_unit(source)
    }

    fn first_body(unit: &TranslationUnit) -> &[Stmt] {
        match &unit.functions[0].body.kind {
            StmtKind::Compound(stmts) => stmts,
            _ => panic!("function body is not a compound statement"),
        }
    }

    #[test]
    fn test_empty_function() {
        let unit = parse("void test(void) {}").unwrap();
        assert_eq!(unit.functions.len(), 1);
        assert_eq!(unit.functions[0].name, "test");
        assert!(unit.functions[0].params.is_empty());
    }

    #[test]
    fn test_array_params() {
        let unit = parse("void f(int n, double A[][100], float *restrict b) {}").unwrap();
        let params = &unit.functions[0].params;
        assert_eq!(params.len(), 3);
        assert_eq!(params[1].declarators[0].array_dims.len(), 2);
        assert_eq!(params[2].declarators[0].pointer_depth, 1);
    }

    #[test]
    fn test_for_loop_header_span() {
        let source = "void f() { for (int i = 0; i < 10; i++) a[i] = 0; }";
        let unit = parse(source).unwrap();
        let body = first_body(&unit);
        let for_loop = body[0].as_for().unwrap();
        assert_eq!(unit.text(&for_loop.header_span), "for (int i = 0; i < 10; i++)");
        assert!(matches!(for_loop.init.unwrap().kind, StmtKind::Decl(_)));
        assert_eq!(unit.text(&for_loop.cond.unwrap().span), "i < 10");
    }

    #[test]
    fn test_precedence() {
        let unit = parse("void f() { x = a + b * c - d; }").unwrap();
        let StmtKind::Expr(expr) = &first_body(&unit)[0].kind else { panic!("expected expression") };
        let (op, _, rhs) = expr.as_assignment().unwrap();
        assert_eq!(op, BinaryOp::Assign);
        match &rhs.kind {
            ExprKind::Binary { op: BinaryOp::Sub, left, .. } => {
                assert!(matches!(left.kind, ExprKind::Binary { op: BinaryOp::Add, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_pragma_statement() {
        let source = "void f() {\n#pragma acc parallel loop\n for (i = 0; i < 4; i++) ; }";
        let unit = parse(source).unwrap();
        let body = first_body(&unit);
        assert!(matches!(&body[0].kind, StmtKind::Pragma(p) if p == "#pragma acc parallel loop"));
        assert!(body[1].is_for());
    }

    #[test]
    fn test_typedef_and_cast() {
        let source = "typedef double real; real g; void f() { size_t i = (size_t) 3; real *p = 0; }";
        let unit = parse(source).unwrap();
        assert_eq!(unit.globals.len(), 1);
        let body = first_body(&unit);
        assert!(matches!(body[0].kind, StmtKind::Decl(_)));
        assert!(matches!(body[1].kind, StmtKind::Decl(_)));
    }

    #[test]
    fn test_control_flow_statements() {
        let source = "int f(int n) { while (n) { if (n > 3) break; else continue; } do n--; while (n); goto out; out: return n; }";
        let unit = parse(source).unwrap();
        assert_eq!(first_body(&unit).len(), 4);
    }

    #[test]
    fn test_integer_literals() {
        assert_eq!(parse_int_literal("0x10"), Some(16));
        assert_eq!(parse_int_literal("010"), Some(8));
        assert_eq!(parse_int_literal("42UL"), Some(42));
        assert_eq!(parse_int_literal("0"), Some(0));
    }

    #[test]
    fn test_parse_error_reported() {
        assert!(parse("void f() { for (i = 0; i < ; i++) }").is_err());
    }

    #[test]
    fn test_multiple_declarators() {
        let unit = parse("int a = 1, b[4], *c;").unwrap();
        let names: Vec<_> = unit.globals[0].declarators.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
