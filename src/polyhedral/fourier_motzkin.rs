//! Fourier-Motzkin feasibility test.
//!
//! Variables are eliminated one at a time by combining every row with a
//! positive coefficient against every row with a negative one. Rows are
//! gcd-normalised after each step, which makes the test exact for many
//! small integer systems but it remains a rational relaxation in general:
//! "feasible" means "may have an integer solution".
//!
//! Row counts can grow quadratically per step, so the eliminator stops with
//! [`DependenceFailureKind::ComplexityLimit`] once a configured limit is
//! exceeded, and polls the cancellation token between steps.

use crate::polyhedral::constraint::{Constraint, ConstraintSystem};
use crate::utils::cancel::CancellationToken;
use crate::utils::errors::{DependenceFailureKind, DependenceTestFailure};
use std::collections::HashMap;

/// Default limit on rows kept between elimination steps.
pub const DEFAULT_MAX_ROWS: usize = 4096;

/// Feasibility tester for [`ConstraintSystem`]s.
#[derive(Debug, Clone)]
pub struct FourierMotzkin<'c> {
    max_rows: usize,
    cancel: Option<&'c CancellationToken>,
}

impl Default for FourierMotzkin<'_> {
    fn default() -> Self {
        Self { max_rows: DEFAULT_MAX_ROWS, cancel: None }
    }
}

impl<'c> FourierMotzkin<'c> {
    pub fn new(max_rows: usize) -> Self {
        Self { max_rows, cancel: None }
    }

    /// Poll `token` between elimination steps.
    pub fn with_cancellation(mut self, token: &'c CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// True when the system may have a solution.
    pub fn is_feasible(&self, system: &ConstraintSystem) -> Result<bool, DependenceTestFailure> {
        let mut rows = match simplify(system.constraints.clone()) {
            Some(rows) => rows,
            None => return Ok(false),
        };

        let mut live: Vec<usize> = (0..system.n_vars()).collect();
        while !live.is_empty() {
            if self.cancel.map_or(false, CancellationToken::is_cancelled) {
                return Err(DependenceTestFailure::new(
                    DependenceFailureKind::Cancelled,
                    "dependence test cancelled",
                ));
            }

            let (position, var) = match cheapest_variable(&rows, &live) {
                Some(choice) => choice,
                None => break,
            };
            live.swap_remove(position);

            let eliminated = eliminate(&rows, var).ok_or_else(|| {
                DependenceTestFailure::new(
                    DependenceFailureKind::ComplexityLimit,
                    format!("coefficient overflow while eliminating '{}'", system.names[var]),
                )
            })?;
            rows = match simplify(eliminated) {
                Some(rows) => rows,
                None => {
                    log::trace!("contradiction after eliminating {}", system.names[var]);
                    return Ok(false);
                }
            };
            if rows.len() > self.max_rows {
                return Err(DependenceTestFailure::new(
                    DependenceFailureKind::ComplexityLimit,
                    format!("constraint system grew to {} rows (limit {})", rows.len(), self.max_rows),
                ));
            }
        }

        Ok(true)
    }
}

/// Picks the live variable whose elimination creates the fewest rows.
/// Returns `None` once no live variable appears in any row.
fn cheapest_variable(rows: &[Constraint], live: &[usize]) -> Option<(usize, usize)> {
    live.iter()
        .enumerate()
        .filter_map(|(position, &var)| {
            let positive = rows.iter().filter(|r| r.coefficient(var) > 0).count();
            let negative = rows.iter().filter(|r| r.coefficient(var) < 0).count();
            if positive + negative == 0 {
                None
            } else {
                Some((positive * negative, position, var))
            }
        })
        .min()
        .map(|(_, position, var)| (position, var))
}

fn eliminate(rows: &[Constraint], var: usize) -> Option<Vec<Constraint>> {
    let (mut upper, mut lower, mut result) = (Vec::new(), Vec::new(), Vec::new());
    for row in rows {
        match row.coefficient(var).signum() {
            1 => upper.push(row),
            -1 => lower.push(row),
            _ => result.push(row.clone()),
        }
    }

    for p in &upper {
        for n in &lower {
            let a = p.coefficient(var);
            let b = n.coefficient(var).checked_neg()?;
            // b·p + a·n cancels `var`
            let mut combined = p.combine(b, n, a)?;
            combined.coeffs[var] = 0;
            result.push(combined);
        }
    }
    Some(result)
}

/// Normalise, drop tautologies and keep the tightest bound per coefficient
/// vector. `None` signals a contradiction.
fn simplify(rows: Vec<Constraint>) -> Option<Vec<Constraint>> {
    let mut tightest: HashMap<Vec<i64>, i64> = HashMap::new();
    for mut row in rows {
        row.normalize();
        if row.is_contradiction() {
            return None;
        }
        if row.is_tautology() {
            continue;
        }
        tightest
            .entry(row.coeffs)
            .and_modify(|bound| *bound = (*bound).min(row.bound))
            .or_insert(row.bound);
    }

    // x <= b together with -x <= c needs -c <= b
    for (coeffs, &bound) in &tightest {
        let negated: Vec<i64> = coeffs.iter().map(|c| -c).collect();
        if let Some(&opposite) = tightest.get(&negated) {
            if (bound as i128) + (opposite as i128) < 0 {
                return None;
            }
        }
    }

    let mut result: Vec<Constraint> = tightest
        .into_iter()
        .map(|(coeffs, bound)| Constraint::new(coeffs, bound))
        .collect();
    result.sort_by(|a, b| a.coeffs.cmp(&b.coeffs).then(a.bound.cmp(&b.bound)));
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system(names: &[&str]) -> ConstraintSystem {
        ConstraintSystem::new(names.iter().map(|n| n.to_string()).collect())
    }

    #[test]
    fn test_box_is_feasible() {
        let mut sys = system(&["i", "j"]);
        sys.add_range(0, 0, 9).unwrap();
        sys.add_range(1, 0, 9).unwrap();
        sys.add_equality(vec![1, -1], 0).unwrap();
        assert!(FourierMotzkin::default().is_feasible(&sys).unwrap());
    }

    #[test]
    fn test_disjoint_ranges_are_infeasible() {
        // i = j + 20 with both in [0, 9]
        let mut sys = system(&["i", "j"]);
        sys.add_range(0, 0, 9).unwrap();
        sys.add_range(1, 0, 9).unwrap();
        sys.add_equality(vec![1, -1], 20).unwrap();
        assert!(!FourierMotzkin::default().is_feasible(&sys).unwrap());
    }

    #[test]
    fn test_integer_tightening() {
        // 2i = 1 has no integer solution
        let mut sys = system(&["i"]);
        sys.add_equality(vec![2], 1).unwrap();
        assert!(!FourierMotzkin::default().is_feasible(&sys).unwrap());
    }

    #[test]
    fn test_strict_ordering() {
        // i < j, j < k, k < i
        let mut sys = system(&["i", "j", "k"]);
        sys.add(Constraint::difference(0, 1, -1, 3));
        sys.add(Constraint::difference(1, 2, -1, 3));
        sys.add(Constraint::difference(2, 0, -1, 3));
        assert!(!FourierMotzkin::default().is_feasible(&sys).unwrap());
    }

    #[test]
    fn test_row_limit_and_cancellation() {
        let names: Vec<&str> = vec!["a", "b", "c", "d"];
        let mut sys = system(&names);
        for x in 0..4 {
            for y in 0..4 {
                if x != y {
                    sys.add(Constraint::difference(x, y, 5, 4));
                }
            }
        }
        let err = FourierMotzkin::new(2).is_feasible(&sys).unwrap_err();
        assert_eq!(err.kind, DependenceFailureKind::ComplexityLimit);

        let token = CancellationToken::new();
        token.cancel();
        let err = FourierMotzkin::default().with_cancellation(&token).is_feasible(&sys).unwrap_err();
        assert_eq!(err.kind, DependenceFailureKind::Cancelled);
    }
}
