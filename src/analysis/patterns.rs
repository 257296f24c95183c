//! Counted-loop header patterns.
//!
//! A loop is "counted" when its header matches one of a fixed catalog of
//! shapes: `i = LB` or `TYPE i = LB`, then `i < UB` or `i <= UB`, then
//! `i++`, `++i`, `i += 1` or `i = i + 1`. Patterns are written as C and
//! parsed with the regular front end. While matching:
//!
//! - any integer literal in the pattern matches any integer literal,
//! - the metavariables `LB` and `UB` match any expression,
//! - every other identifier binds to a candidate identifier, and the same
//!   pattern name must bind to the same candidate name throughout.

use crate::frontend::ast::*;
use crate::frontend::parse_statement;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Integer type spellings accepted in a declaring initializer.
const INDEX_TYPES: &[&str] = &[
    "int",
    "long",
    "short",
    "unsigned",
    "unsigned int",
    "long int",
    "unsigned long",
    "long long",
    "size_t",
];

const CONDITIONS: &[&str] = &["i < UB", "i <= UB"];

const INCREMENTS: &[&str] = &["i++", "++i", "i += 1", "i = i + 1"];

/// Metavariables that match any expression.
const WILDCARDS: &[&str] = &["LB", "UB"];

/// A parsed catalog entry.
#[derive(Debug)]
pub struct LoopPattern {
    pub text: String,
    stmt: Stmt,
}

/// The catalog, parsed once.
pub static COUNTED_LOOP_PATTERNS: Lazy<Vec<LoopPattern>> = Lazy::new(build_catalog);

fn build_catalog() -> Vec<LoopPattern> {
    let mut inits: Vec<String> = vec!["i = LB".to_string()];
    inits.extend(INDEX_TYPES.iter().map(|ty| format!("{} i = LB", ty)));

    let mut patterns = Vec::new();
    for init in &inits {
        for cond in CONDITIONS {
            for incr in INCREMENTS {
                let text = format!("for ({}; {}; {}) ;", init, cond, incr);
                match parse_statement(&text) {
                    Ok(stmt) => patterns.push(LoopPattern { text, stmt }),
                    Err(e) => log::warn!("skipping malformed loop pattern '{}': {}", text, e),
                }
            }
        }
    }
    patterns
}

/// The first catalog entry matching `stmt`'s header, with the binding of
/// pattern names to candidate names.
pub fn match_counted_loop(stmt: &Stmt) -> Option<(&'static LoopPattern, HashMap<String, String>)> {
    let candidate = stmt.as_for()?;
    COUNTED_LOOP_PATTERNS.iter().find_map(|pattern| {
        let shape = pattern.stmt.as_for()?;
        let mut matcher = Matcher::default();
        let matched = matcher.opt_stmt(shape.init, candidate.init)
            && matcher.opt_expr(shape.cond, candidate.cond)
            && matcher.opt_expr(shape.iter, candidate.iter);
        matched.then_some((pattern, matcher.bindings))
    })
}

/// True when `stmt` is a `for` statement matching the catalog.
pub fn is_counted_loop(stmt: &Stmt) -> bool {
    match_counted_loop(stmt).is_some()
}

#[derive(Default)]
struct Matcher {
    bindings: HashMap<String, String>,
}

impl Matcher {
    fn bind(&mut self, pattern_name: &str, name: &str) -> bool {
        match self.bindings.get(pattern_name) {
            Some(bound) => bound == name,
            None => {
                self.bindings.insert(pattern_name.to_string(), name.to_string());
                true
            }
        }
    }

    fn opt_stmt(&mut self, pattern: Option<&Stmt>, candidate: Option<&Stmt>) -> bool {
        match (pattern, candidate) {
            (None, None) => true,
            (Some(p), Some(c)) => self.stmt(p, c),
            _ => false,
        }
    }

    fn opt_expr(&mut self, pattern: Option<&Expr>, candidate: Option<&Expr>) -> bool {
        match (pattern, candidate) {
            (None, None) => true,
            (Some(p), Some(c)) => self.expr(p, c),
            _ => false,
        }
    }

    fn stmt(&mut self, pattern: &Stmt, candidate: &Stmt) -> bool {
        match (&pattern.kind, &candidate.kind) {
            (StmtKind::Expr(p), StmtKind::Expr(c)) => self.expr(p, c),
            (StmtKind::Decl(p), StmtKind::Decl(c)) => {
                p.specifiers == c.specifiers
                    && p.declarators.len() == c.declarators.len()
                    && p.declarators.iter().zip(&c.declarators).all(|(pd, cd)| {
                        pd.pointer_depth == cd.pointer_depth
                            && pd.array_dims.len() == cd.array_dims.len()
                            && self.bind(&pd.name, &cd.name)
                            && match (&pd.init, &cd.init) {
                                (Some(pi), Some(ci)) => self.expr(pi, ci),
                                (None, None) => true,
                                _ => false,
                            }
                    })
            }
            _ => false,
        }
    }

    fn expr(&mut self, pattern: &Expr, candidate: &Expr) -> bool {
        match (&pattern.kind, &candidate.kind) {
            (ExprKind::Identifier(name), _) if WILDCARDS.contains(&name.as_str()) => true,
            (ExprKind::IntLiteral(_), ExprKind::IntLiteral(_)) => true,
            (ExprKind::Identifier(p), ExprKind::Identifier(c)) => self.bind(p, c),
            (
                ExprKind::Binary { op: po, left: pl, right: pr },
                ExprKind::Binary { op: co, left: cl, right: cr },
            ) => po == co && self.expr(pl, cl) && self.expr(pr, cr),
            (
                ExprKind::Unary { op: po, operand: p },
                ExprKind::Unary { op: co, operand: c },
            ) => po == co && self.expr(p, c),
            (ExprKind::Paren(p), ExprKind::Paren(c)) => self.expr(p, c),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counted(header: &str) -> bool {
        let stmt = parse_statement(&format!("{} ;", header)).unwrap();
        is_counted_loop(&stmt)
    }

    #[test]
    fn test_catalog_parses_completely() {
        assert_eq!(COUNTED_LOOP_PATTERNS.len(), (INDEX_TYPES.len() + 1) * CONDITIONS.len() * INCREMENTS.len());
    }

    #[test]
    fn test_supported_shapes() {
        for header in [
            "for (i = 0; i < 10; i++)",
            "for (int i = 0; i <= n; ++i)",
            "for (unsigned long k = 3; k < n - 1; k += 1)",
            "for (j = lo; j < hi; j = j + 1)",
            "for (long long t = 0; t < 8; t += 4)",
            "for (size_t q = 0; q < len; q++)",
        ] {
            assert!(counted(header), "{}", header);
        }
    }

    #[test]
    fn test_unsupported_shapes() {
        for header in [
            "for (i = 0; i != 10; i++)",
            "for (i = 0; i < 10; i += k)",
            "for (i = 0; i < 10; j++)",
            "for (i = 0; j < 10; i++)",
            "for (i = 0; i > 10; i--)",
            "for (double x = 0; x < 1; x++)",
            "for (; i < 10; i++)",
            "for (i = 0; i < 10; i = j + 1)",
        ] {
            assert!(!counted(header), "{}", header);
        }
    }

    #[test]
    fn test_binding_reports_index_name() {
        let stmt = parse_statement("for (int row = 0; row < 4; row++) ;").unwrap();
        let (_, bindings) = match_counted_loop(&stmt).unwrap();
        assert_eq!(bindings.get("i").map(String::as_str), Some("row"));
    }
}
