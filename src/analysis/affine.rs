//! Affine index expressions.
//!
//! Array subscripts and loop bounds are normalised to
//! `constant + Σ coefficient·variable`. Only `+`, `-` and `*` by an integer
//! literal are accepted; every other shape is an [`AffineParseError`], and
//! callers must treat that as "a dependence may exist".

use crate::frontend::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use crate::utils::errors::AffineParseError;
use crate::utils::location::SourceMap;
use std::collections::BTreeMap;
use std::fmt;

/// `constant + Σ coefficient·variable` with no zero coefficients stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AffineExpr {
    /// Constant term
    pub constant: i64,
    /// Variable name → coefficient
    pub coefficients: BTreeMap<String, i64>,
}

/// How an operand of a binary expression is handled.
enum Operand<'e> {
    Literal(i64),
    Identifier(&'e str),
    Nested(&'e Expr),
}

fn classify(expr: &Expr) -> Operand<'_> {
    let expr = expr.unparen();
    match &expr.kind {
        ExprKind::IntLiteral(value) => Operand::Literal(*value),
        ExprKind::Identifier(name) => Operand::Identifier(name),
        _ => Operand::Nested(expr),
    }
}

impl AffineExpr {
    /// The zero expression.
    pub fn zero() -> Self {
        Self::default()
    }

    /// A constant expression.
    pub fn constant(value: i64) -> Self {
        Self { constant: value, coefficients: BTreeMap::new() }
    }

    /// `1·name`.
    pub fn var(name: impl Into<String>) -> Self {
        let mut expr = Self::zero();
        expr.coefficients.insert(name.into(), 1);
        expr
    }

    /// Parse an expression tree into normal form.
    pub fn parse(expr: &Expr, source: &SourceMap) -> Result<Self, AffineParseError> {
        let mut parser = AffineParser { source, result: AffineExpr::zero() };
        parser.visit(expr, false)?;
        Ok(parser.result)
    }

    /// Coefficient of `name` (0 when absent).
    pub fn coefficient(&self, name: &str) -> i64 {
        self.coefficients.get(name).copied().unwrap_or(0)
    }

    /// Variables with non-zero coefficients.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.coefficients.keys().map(String::as_str)
    }

    /// True when no variable appears.
    pub fn is_constant(&self) -> bool {
        self.coefficients.is_empty()
    }

    /// Add `coefficient·name`, dropping the entry if it cancels to zero.
    pub fn add_term(&mut self, name: &str, coefficient: i64) -> Option<()> {
        let updated = self.coefficient(name).checked_add(coefficient)?;
        if updated == 0 {
            self.coefficients.remove(name);
        } else {
            self.coefficients.insert(name.to_string(), updated);
        }
        Some(())
    }

    /// `self + factor·other`, `None` on overflow.
    pub fn add_scaled(&mut self, other: &AffineExpr, factor: i64) -> Option<()> {
        self.constant = self.constant.checked_add(other.constant.checked_mul(factor)?)?;
        for (name, coefficient) in &other.coefficients {
            self.add_term(name, coefficient.checked_mul(factor)?)?;
        }
        Some(())
    }

    /// `self - other`, `None` on overflow.
    pub fn checked_sub(&self, other: &AffineExpr) -> Option<AffineExpr> {
        let mut result = self.clone();
        result.add_scaled(other, -1)?;
        Some(result)
    }

    /// Replace each variable by its image under `rename` (unlisted names kept).
    pub fn renamed(&self, rename: impl Fn(&str) -> String) -> AffineExpr {
        let mut result = AffineExpr::constant(self.constant);
        for (name, coefficient) in &self.coefficients {
            // Renaming two variables onto one name merges their terms
            let target = rename(name);
            let merged = result.coefficient(&target).saturating_add(*coefficient);
            if merged == 0 {
                result.coefficients.remove(&target);
            } else {
                result.coefficients.insert(target, merged);
            }
        }
        result
    }
}

impl fmt::Display for AffineExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, &coefficient) in &self.coefficients {
            let magnitude = coefficient.unsigned_abs();
            match (first, coefficient < 0) {
                (true, true) => write!(f, "-")?,
                (false, true) => write!(f, " - ")?,
                (false, false) => write!(f, " + ")?,
                (true, false) => {}
            }
            if magnitude == 1 {
                write!(f, "{}", name)?;
            } else {
                write!(f, "{}*{}", magnitude, name)?;
            }
            first = false;
        }
        if first {
            write!(f, "{}", self.constant)
        } else if self.constant > 0 {
            write!(f, " + {}", self.constant)
        } else if self.constant < 0 {
            write!(f, " - {}", self.constant.unsigned_abs())
        } else {
            Ok(())
        }
    }
}

/// Recursive accumulation with a negation flag.
///
/// The flag is threaded into the right operand of `-` so that
/// `i - (j + 1)` contributes `-j` and `-1`.
struct AffineParser<'s> {
    source: &'s SourceMap,
    result: AffineExpr,
}

impl<'s> AffineParser<'s> {
    fn fail(&self, message: &str, expr: &Expr) -> AffineParseError {
        AffineParseError::new(message, self.source.span_text(&expr.span), expr.span.start_line)
    }

    fn overflow(&self, expr: &Expr) -> AffineParseError {
        self.fail("Integer overflow in index expression", expr)
    }

    fn add_constant(&mut self, value: i64, negate: bool, at: &Expr) -> Result<(), AffineParseError> {
        let value = if negate { value.checked_neg() } else { Some(value) };
        self.result.constant = value
            .and_then(|v| self.result.constant.checked_add(v))
            .ok_or_else(|| self.overflow(at))?;
        Ok(())
    }

    fn add_variable(&mut self, name: &str, coefficient: i64, negate: bool, at: &Expr) -> Result<(), AffineParseError> {
        let coefficient = if negate { coefficient.checked_neg() } else { Some(coefficient) };
        coefficient
            .and_then(|c| self.result.add_term(name, c))
            .ok_or_else(|| self.overflow(at))
    }

    /// Parse `expr` on its own and add `factor·expr` to the result.
    fn add_scaled_subtree(&mut self, expr: &Expr, factor: i64, negate: bool) -> Result<(), AffineParseError> {
        let sub = AffineExpr::parse(expr, self.source)?;
        let factor = if negate { factor.checked_neg() } else { Some(factor) };
        factor
            .and_then(|f| self.result.add_scaled(&sub, f))
            .ok_or_else(|| self.overflow(expr))
    }

    fn visit(&mut self, expr: &Expr, negate: bool) -> Result<(), AffineParseError> {
        let expr = expr.unparen();
        match &expr.kind {
            ExprKind::IntLiteral(value) => self.add_constant(*value, negate, expr),
            ExprKind::Identifier(name) => self.add_variable(name, 1, negate, expr),
            ExprKind::Unary { op: UnaryOp::Neg, operand } => self.visit(operand, !negate),
            ExprKind::Unary { op: UnaryOp::Plus, operand } => self.visit(operand, negate),
            ExprKind::Binary { op, left, right } => self.visit_binary(*op, left, right, negate, expr),
            _ => Err(self.fail("Unsupported expression in index", expr)),
        }
    }

    fn visit_binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        negate: bool,
        whole: &Expr,
    ) -> Result<(), AffineParseError> {
        let right_negate = match op {
            BinaryOp::Add => negate,
            BinaryOp::Sub => !negate,
            BinaryOp::Mul => return self.visit_product(left, right, negate, whole),
            _ => return Err(self.fail(&format!("Unsupported operator '{}' in index", op), whole)),
        };

        match (classify(left), classify(right)) {
            (Operand::Literal(_), Operand::Literal(_)) => {
                Err(self.fail("Constant expression should have been folded", whole))
            }
            (Operand::Identifier(a), Operand::Identifier(b)) => {
                self.add_variable(a, 1, negate, whole)?;
                self.add_variable(b, 1, right_negate, whole)
            }
            (Operand::Identifier(a), Operand::Literal(k)) => {
                self.add_variable(a, 1, negate, whole)?;
                self.add_constant(k, right_negate, whole)
            }
            (Operand::Literal(k), Operand::Identifier(b)) => {
                self.add_constant(k, negate, whole)?;
                self.add_variable(b, 1, right_negate, whole)
            }
            _ => {
                self.visit(left, negate)?;
                self.visit(right, right_negate)
            }
        }
    }

    fn visit_product(&mut self, left: &Expr, right: &Expr, negate: bool, whole: &Expr) -> Result<(), AffineParseError> {
        match (classify(left), classify(right)) {
            (Operand::Literal(_), Operand::Literal(_)) => {
                Err(self.fail("Constant expression should have been folded", whole))
            }
            (Operand::Identifier(name), Operand::Literal(k)) | (Operand::Literal(k), Operand::Identifier(name)) => {
                self.add_variable(name, k, negate, whole)
            }
            (Operand::Nested(sub), Operand::Literal(k)) | (Operand::Literal(k), Operand::Nested(sub)) => {
                self.add_scaled_subtree(sub, k, negate)
            }
            _ => Err(self.fail("Non-affine product in index", whole)),
        }
    }
}
