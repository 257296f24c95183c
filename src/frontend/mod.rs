//! Frontend: Lexer, Parser, AST and name resolution for C.
//!
//! This module turns C source text into an AST whose nodes carry byte
//! offsets into the original buffer.
//!
//! ```text
//! void scale(int n, double a[100]) {
//!     for (int i = 0; i < 100; i++)
//!         a[i] = a[i] * 2;
//! }
//! ```

pub mod token;
pub mod lexer;
pub mod ast;
pub mod parser;
pub mod index;
pub mod resolve;

// Re-exports
pub use lexer::Lexer;
pub use parser::Parser;
pub use ast::*;
pub use index::{AstIndex, NodeRef};
pub use resolve::{Binding, Bindings};
pub use token::{Token, TokenKind};
pub use crate::utils::errors::ParseError;

use anyhow::{Context, Result};

/// Parse source code into an AST.
pub fn parse(source: &str) -> Result<TranslationUnit> {
    let lexer = Lexer::new(source);
    let mut parser = Parser::new(lexer).context("failed to tokenize source")?;
    parser
        .parse_translation_unit(source)
        .context("failed to parse source")
}

/// Parse a single statement, as used for loop header patterns.
pub fn parse_statement(source: &str) -> Result<Stmt, ParseError> {
    let mut parser = Parser::new(Lexer::new(source))?;
    parser.parse_standalone_statement()
}

/// Parse a single expression.
pub fn parse_expression(source: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(Lexer::new(source))?;
    parser.parse_standalone_expression()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let source = r#"
            void test(double a[10]) {
                for (int i = 0; i < 10; i++) {
                    a[i] = i;
                }
            }
        "#;
        let result = parse(source);
        assert!(result.is_ok());
    }

    #[test]
    fn test_parse_statement_and_expression() {
        assert!(parse_statement("for (i = 0; i < n; i++) ;").unwrap().is_for());
        let expr = parse_expression("2*i + j - 3").unwrap();
        assert!(matches!(expr.kind, ExprKind::Binary { op: BinaryOp::Sub, .. }));
        assert!(parse_statement("x = 1; y = 2;").is_err());
    }
}
