//! Linear constraints over integer variables.
//!
//! Every constraint is an inequality in the form `a·x <= b`. An equality
//! `a·x = b` is stored as the pair `a·x <= b` and `-a·x <= -b`.

use num_integer::Integer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A linear inequality: `coeffs · x <= bound`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constraint {
    /// One coefficient per system variable
    pub coeffs: Vec<i64>,
    /// Right-hand side
    pub bound: i64,
}

impl Constraint {
    /// Create a new constraint.
    pub fn new(coeffs: Vec<i64>, bound: i64) -> Self {
        Self { coeffs, bound }
    }

    /// `var >= lower`, i.e. `-var <= -lower`.
    pub fn lower_bound(var: usize, lower: i64, n_vars: usize) -> Option<Self> {
        let mut coeffs = vec![0; n_vars];
        coeffs[var] = -1;
        Some(Self::new(coeffs, lower.checked_neg()?))
    }

    /// `var <= upper`.
    pub fn upper_bound(var: usize, upper: i64, n_vars: usize) -> Self {
        let mut coeffs = vec![0; n_vars];
        coeffs[var] = 1;
        Self::new(coeffs, upper)
    }

    /// `a - b <= bound`.
    pub fn difference(a: usize, b: usize, bound: i64, n_vars: usize) -> Self {
        let mut coeffs = vec![0; n_vars];
        coeffs[a] += 1;
        coeffs[b] -= 1;
        Self::new(coeffs, bound)
    }

    /// Coefficient of `var`.
    pub fn coefficient(&self, var: usize) -> i64 {
        self.coeffs.get(var).copied().unwrap_or(0)
    }

    /// True when every coefficient is zero.
    pub fn is_constant(&self) -> bool {
        self.coeffs.iter().all(|&c| c == 0)
    }

    /// `0 <= negative`: no point satisfies this row.
    pub fn is_contradiction(&self) -> bool {
        self.is_constant() && self.bound < 0
    }

    /// `0 <= non-negative`: every point satisfies this row.
    pub fn is_tautology(&self) -> bool {
        self.is_constant() && self.bound >= 0
    }

    /// Divide through by the coefficient gcd, flooring the bound.
    ///
    /// Only integer points are of interest, so `2x <= 3` tightens to
    /// `x <= 1`.
    pub fn normalize(&mut self) {
        let g = self.coeffs.iter().fold(0i64, |acc, &c| acc.gcd(&c));
        if g > 1 {
            for c in &mut self.coeffs {
                *c /= g;
            }
            self.bound = self.bound.div_floor(&g);
        }
    }

    /// `scale_self·self + scale_other·other`, `None` on overflow.
    pub fn combine(&self, scale_self: i64, other: &Constraint, scale_other: i64) -> Option<Constraint> {
        let coeffs = self
            .coeffs
            .iter()
            .zip(&other.coeffs)
            .map(|(&a, &b)| a.checked_mul(scale_self)?.checked_add(b.checked_mul(scale_other)?))
            .collect::<Option<Vec<_>>>()?;
        let bound = self
            .bound
            .checked_mul(scale_self)?
            .checked_add(other.bound.checked_mul(scale_other)?)?;
        Some(Constraint::new(coeffs, bound))
    }

    /// Check if this constraint is satisfied by the given point.
    pub fn is_satisfied(&self, point: &[i64]) -> bool {
        let lhs: i128 = self
            .coeffs
            .iter()
            .zip(point)
            .map(|(&c, &x)| c as i128 * x as i128)
            .sum();
        lhs <= self.bound as i128
    }

    /// Convert to string with given names.
    pub fn to_string_with_names(&self, names: &[String]) -> String {
        let mut lhs = String::new();
        for (var, &c) in self.coeffs.iter().enumerate() {
            if c == 0 {
                continue;
            }
            let name = names.get(var).cloned().unwrap_or_else(|| format!("x{}", var));
            let sign = if c < 0 { "-" } else { "+" };
            if lhs.is_empty() {
                if c < 0 {
                    lhs.push('-');
                }
            } else {
                lhs.push_str(&format!(" {} ", sign));
            }
            if c.abs() == 1 {
                lhs.push_str(&name);
            } else {
                lhs.push_str(&format!("{}*{}", c.unsigned_abs(), name));
            }
        }
        if lhs.is_empty() {
            lhs.push('0');
        }
        format!("{} <= {}", lhs, self.bound)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_with_names(&[]))
    }
}

/// A system of constraints over named variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConstraintSystem {
    /// Variable names, by column
    pub names: Vec<String>,
    /// All constraints in the system
    pub constraints: Vec<Constraint>,
}

impl ConstraintSystem {
    /// Create an empty system over `names`.
    pub fn new(names: Vec<String>) -> Self {
        Self { names, constraints: Vec::new() }
    }

    /// Number of variables.
    pub fn n_vars(&self) -> usize {
        self.names.len()
    }

    /// Column of `name`.
    pub fn var(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Add a constraint.
    pub fn add(&mut self, constraint: Constraint) {
        debug_assert_eq!(constraint.coeffs.len(), self.n_vars());
        self.constraints.push(constraint);
    }

    /// Add `coeffs · x = value` as two opposing inequalities.
    pub fn add_equality(&mut self, coeffs: Vec<i64>, value: i64) -> Option<()> {
        let negated = coeffs.iter().map(|c| c.checked_neg()).collect::<Option<Vec<_>>>()?;
        let negated_value = value.checked_neg()?;
        self.add(Constraint::new(coeffs, value));
        self.add(Constraint::new(negated, negated_value));
        Some(())
    }

    /// Add `lower <= var <= upper`.
    pub fn add_range(&mut self, var: usize, lower: i64, upper: i64) -> Option<()> {
        let n = self.n_vars();
        self.add(Constraint::lower_bound(var, lower, n)?);
        self.add(Constraint::upper_bound(var, upper, n));
        Some(())
    }

    /// Check if a point satisfies all constraints.
    pub fn is_satisfied(&self, point: &[i64]) -> bool {
        self.constraints.iter().all(|c| c.is_satisfied(point))
    }

    /// Check if the system is empty (has no constraints).
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Get the number of constraints.
    pub fn len(&self) -> usize {
        self.constraints.len()
    }
}

impl fmt::Display for ConstraintSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in &self.constraints {
            writeln!(f, "{}", c.to_string_with_names(&self.names))?;
        }
        Ok(())
    }
}
