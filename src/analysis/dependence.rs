//! Dependence analysis for loop nests.
//!
//! This module decides which array accesses of a perfect loop nest may touch
//! the same element in different iterations:
//! - GCD test on each subscript equation for a quick independence proof
//! - Fourier-Motzkin feasibility of the bounded equation system
//! - Hierarchical direction vector refinement (`<`, `=`, `>` per level)
//! - Flow/anti/output classification
//!
//! Each induction variable gets a source copy and a sink copy so the two
//! accesses may range independently before the subscript equations tie them
//! together. Any failure to model the nest is reported as a
//! [`DependenceTestFailure`] and must never be read as "no dependence".
//!
//! Only assignments whose target is an array element are scanned; the
//! array elements read on their right-hand side (and the target itself for
//! compound assignments) are the reads. Assignments to scalars are skipped.

use crate::analysis::affine::AffineExpr;
use crate::analysis::constant::written_identifier;
use crate::analysis::induction::InductionVariable;
use crate::analysis::loops::{first_jump, nesting, Nesting};
use crate::context::RefactoringContext;
use crate::frontend::ast::*;
use crate::polyhedral::{Constraint, ConstraintSystem, FourierMotzkin};
use crate::utils::errors::{DependenceFailureKind, DependenceTestFailure};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A data dependence between two statement instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependence {
    /// Statement executed first
    pub source: NodeId,
    /// Statement executed second
    pub sink: NodeId,
    /// Array access in the source statement
    pub source_access: NodeId,
    /// Array access in the sink statement
    pub sink_access: NodeId,
    /// Kind of dependence
    pub kind: DependenceKind,
    /// Array involved in this dependence
    pub array: String,
    /// One entry per nest level, outermost first
    pub direction: Vec<Direction>,
    /// Source line of the source access
    pub line: usize,
}

impl Dependence {
    /// Check if this is a loop-carried dependence.
    pub fn is_loop_carried(&self) -> bool {
        self.carried_level().is_some()
    }

    /// Outermost level with a non-`=` entry.
    pub fn carried_level(&self) -> Option<usize> {
        self.direction.iter().position(|d| *d != Direction::Eq)
    }

    /// Get a human-readable description.
    pub fn description(&self) -> String {
        format!(
            "{} dependence on {} (line {}) dir=({})",
            self.kind.name(),
            self.array,
            self.line,
            format_direction(&self.direction)
        )
    }
}

impl fmt::Display for Dependence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Kind of data dependence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependenceKind {
    /// Read-after-write (true/flow dependence)
    Flow,
    /// Write-after-read (anti dependence)
    Anti,
    /// Write-after-write (output dependence)
    Output,
}

impl DependenceKind {
    /// Classify from which end writes.
    fn between(source_writes: bool, sink_writes: bool) -> Self {
        match (source_writes, sink_writes) {
            (true, false) => DependenceKind::Flow,
            (false, true) => DependenceKind::Anti,
            _ => DependenceKind::Output,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DependenceKind::Flow => "flow",
            DependenceKind::Anti => "anti",
            DependenceKind::Output => "output",
        }
    }
}

/// Direction of a dependence in one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// < (forward dependence, positive distance)
    Lt,
    /// = (same iteration, zero distance)
    Eq,
    /// > (backward dependence, negative distance)
    Gt,
    /// <= (forward or same)
    Le,
    /// >= (backward or same)
    Ge,
    /// * (unknown/any direction)
    Star,
}

impl Direction {
    /// Get the character representation.
    pub fn to_char(&self) -> char {
        match self {
            Direction::Lt => '<',
            Direction::Eq => '=',
            Direction::Gt => '>',
            Direction::Le => '≤',
            Direction::Ge => '≥',
            Direction::Star => '*',
        }
    }

    /// Combine two directions (union).
    pub fn union(&self, other: &Direction) -> Direction {
        if self == other {
            *self
        } else {
            match (self, other) {
                (Direction::Lt, Direction::Eq) | (Direction::Eq, Direction::Lt) => Direction::Le,
                (Direction::Gt, Direction::Eq) | (Direction::Eq, Direction::Gt) => Direction::Ge,
                (Direction::Le, Direction::Lt | Direction::Eq) | (Direction::Lt | Direction::Eq, Direction::Le) => {
                    Direction::Le
                }
                (Direction::Ge, Direction::Gt | Direction::Eq) | (Direction::Gt | Direction::Eq, Direction::Ge) => {
                    Direction::Ge
                }
                _ => Direction::Star,
            }
        }
    }

    /// The direction seen from the other end of the dependence.
    pub fn reversed(&self) -> Direction {
        match self {
            Direction::Lt => Direction::Gt,
            Direction::Gt => Direction::Lt,
            Direction::Le => Direction::Ge,
            Direction::Ge => Direction::Le,
            Direction::Eq => Direction::Eq,
            Direction::Star => Direction::Star,
        }
    }
}

/// `<, =` style rendering of a direction vector.
pub fn format_direction(direction: &[Direction]) -> String {
    direction
        .iter()
        .map(|d| d.to_char().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// A direction vector respects execution order when its first non-`=`
/// entry is `<`, `<=` or `*`. An all-`=` vector is also valid.
pub fn is_valid_direction(direction: &[Direction]) -> bool {
    match direction.iter().find(|d| **d != Direction::Eq) {
        None => true,
        Some(d) => matches!(d, Direction::Lt | Direction::Le | Direction::Star),
    }
}

/// `direction` with entries `a` and `b` exchanged.
pub fn swapped(direction: &[Direction], a: usize, b: usize) -> Vec<Direction> {
    let mut result = direction.to_vec();
    if a < result.len() && b < result.len() {
        result.swap(a, b);
    }
    result
}

/// GCD test for dependence: `Σ coeffs·x = constant` has an integer
/// solution only if the gcd of the coefficients divides the constant.
pub fn gcd_test(coeffs: &[i64], constant: i64) -> bool {
    use num_integer::Integer;
    let g = coeffs.iter().fold(0i64, |acc, &c| acc.gcd(&c));
    if g == 0 {
        constant == 0
    } else {
        constant % g == 0
    }
}

/// One array element access in the innermost body.
#[derive(Debug)]
struct Access<'a> {
    expr: &'a Expr,
    stmt: NodeId,
    array: String,
    subscripts: Vec<AffineExpr>,
    is_write: bool,
}

/// Result of analysing one loop nest.
#[derive(Debug, Clone)]
pub struct DependenceAnalysis {
    dependences: Vec<Dependence>,
}

impl DependenceAnalysis {
    /// Analyse the perfect nest rooted at `outer`.
    ///
    /// Fails on imperfect nesting, unsupported loop headers, jumps,
    /// non-affine subscripts, complexity limits and cancellation.
    pub fn analyze(ctx: &RefactoringContext<'_>, outer: &Stmt) -> Result<Self, DependenceTestFailure> {
        if ctx.is_cancelled() {
            return Err(cancelled());
        }
        let source = ctx.source();
        let scope = ctx.scope_of(outer);

        let body = outer.as_for().map(|f| f.body).ok_or_else(|| {
            DependenceTestFailure::new(DependenceFailureKind::UnsupportedLoopHeader, "Not a for loop")
        })?;
        if let Some(jump) = first_jump(body) {
            return Err(DependenceTestFailure::new(
                DependenceFailureKind::UnsupportedControlFlow,
                format!("Unsupported jump '{}' (line {})", source.span_text(&jump.span).trim(), jump.span.start_line),
            ));
        }

        let mut induction_variables = Vec::new();
        let mut current = outer;
        let innermost = loop {
            induction_variables.push(InductionVariable::derive(current, source, ctx.oracle(), scope)?);
            match nesting(current) {
                Nesting::Leaf => break current,
                Nesting::Single(inner) => current = inner,
                Nesting::Imperfect(inner) => {
                    return Err(DependenceTestFailure::new(
                        DependenceFailureKind::ImperfectNest,
                        format!(
                            "Loop at line {} is not perfectly nested (line {})",
                            current.span.start_line, inner.span.start_line
                        ),
                    ))
                }
            }
        };
        log::debug!(
            "analyzing nest at line {}: {}",
            outer.span.start_line,
            induction_variables.iter().map(|iv| iv.to_string()).collect::<Vec<_>>().join(", ")
        );

        let accesses = collect_accesses(innermost, source)?;
        let written: HashSet<&str> = collect_exprs(outer)
            .into_iter()
            .filter_map(written_identifier)
            .filter_map(Expr::as_identifier)
            .collect();

        let tester = PairTester {
            ctx,
            levels: &induction_variables,
            written: &written,
            fm: FourierMotzkin::new(ctx.config().max_rows).with_cancellation(ctx.cancellation()),
        };

        let mut dependences = Vec::new();
        for (i, first) in accesses.iter().enumerate() {
            for (j, second) in accesses.iter().enumerate().skip(i) {
                if first.array != second.array || !(first.is_write || second.is_write) {
                    continue;
                }
                if i == j && !first.is_write {
                    continue;
                }
                for dep in tester.test(i, first, j, second)? {
                    if !dependences.contains(&dep) {
                        log::debug!("found {}", dep);
                        dependences.push(dep);
                    }
                }
            }
        }

        if ctx.config().merge_directions {
            dependences = merge_directions(dependences);
        }

        Ok(Self { dependences })
    }

    pub fn dependences(&self) -> &[Dependence] {
        &self.dependences
    }

    /// True iff some dependence is carried by the outermost loop.
    pub fn has_level1_carried_dependence(&self) -> bool {
        self.dependences
            .iter()
            .any(|d| d.direction.first().map_or(false, |first| *first != Direction::Eq))
    }

    /// The first dependence made invalid by exchanging level 0 with
    /// `depth`.
    pub fn interchange_violation(&self, depth: usize) -> Option<&Dependence> {
        self.dependences.iter().find(|d| {
            is_valid_direction(&d.direction) && !is_valid_direction(&swapped(&d.direction, 0, depth))
        })
    }

    pub fn is_interchange_valid(&self, depth: usize) -> bool {
        self.interchange_violation(depth).is_none()
    }

    /// True when every entry at levels `0..=depth` is `=`, `<` or `<=`, so
    /// the band may be permuted freely.
    pub fn is_fully_permutable(&self, depth: usize) -> bool {
        self.dependences.iter().all(|d| {
            d.direction
                .iter()
                .take(depth + 1)
                .all(|dir| matches!(dir, Direction::Eq | Direction::Lt | Direction::Le))
        })
    }
}

fn cancelled() -> DependenceTestFailure {
    DependenceTestFailure::new(DependenceFailureKind::Cancelled, "dependence analysis cancelled")
}

fn collect_accesses<'a>(innermost: &'a Stmt, source: &crate::utils::location::SourceMap) -> Result<Vec<Access<'a>>, DependenceTestFailure> {
    let body = innermost.as_for().map(|f| f.body.body_statements()).unwrap_or_default();
    let mut accesses = Vec::new();

    for stmt in body {
        for expr in collect_exprs(stmt) {
            let Some((op, lhs, rhs)) = expr.as_assignment() else {
                continue;
            };
            let lhs = lhs.unparen();
            if lhs.as_array_access().is_none() {
                log::debug!(
                    "skipping assignment to non-array '{}' (line {})",
                    source.span_text(&lhs.span),
                    lhs.span.start_line
                );
                continue;
            }

            let mut reads = Vec::new();
            array_reads(rhs, &mut reads);
            if let Some((_, indices)) = lhs.as_array_access() {
                for index in indices {
                    array_reads(index, &mut reads);
                }
            }
            if op != BinaryOp::Assign {
                reads.push(lhs);
            }

            for read in reads {
                accesses.push(access(read, stmt.id, false, source)?);
            }
            accesses.push(access(lhs, stmt.id, true, source)?);
        }
    }
    Ok(accesses)
}

/// Outermost array element expressions inside `expr`, including those
/// nested in subscripts.
fn array_reads<'a>(expr: &'a Expr, out: &mut Vec<&'a Expr>) {
    let expr = expr.unparen();
    match expr.as_array_access() {
        Some((_, indices)) => {
            out.push(expr);
            for index in indices {
                array_reads(index, out);
            }
        }
        None => {
            for child in expr.children() {
                array_reads(child, out);
            }
        }
    }
}

fn access<'a>(
    expr: &'a Expr,
    stmt: NodeId,
    is_write: bool,
    source: &crate::utils::location::SourceMap,
) -> Result<Access<'a>, DependenceTestFailure> {
    let unsupported = || {
        DependenceTestFailure::new(
            DependenceFailureKind::NonAffineSubscript,
            format!("Unsupported array access '{}' (line {})", source.span_text(&expr.span), expr.span.start_line),
        )
    };
    let (base, indices) = expr.as_array_access().ok_or_else(unsupported)?;
    let array = base.unparen().as_identifier().ok_or_else(unsupported)?.to_string();
    let subscripts = indices
        .into_iter()
        .map(|index| AffineExpr::parse(index, source))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Access { expr, stmt, array, subscripts, is_write })
}

/// Tests one pair of accesses.
struct PairTester<'t, 'c> {
    ctx: &'t RefactoringContext<'c>,
    levels: &'t [InductionVariable],
    written: &'t HashSet<&'t str>,
    fm: FourierMotzkin<'t>,
}

impl PairTester<'_, '_> {
    fn overflow(&self) -> DependenceTestFailure {
        DependenceTestFailure::new(DependenceFailureKind::ComplexityLimit, "integer overflow in dependence system")
    }

    /// Column name of `var` as seen by access number `access` on one side.
    fn column(&self, var: &str, access: usize, sink: bool) -> String {
        if self.levels.iter().any(|iv| iv.name == var) {
            if sink {
                format!("{}'", var)
            } else {
                var.to_string()
            }
        } else if self.written.contains(var) {
            format!("{}@{}", var, access)
        } else {
            var.to_string()
        }
    }

    fn test(&self, i: usize, first: &Access<'_>, j: usize, second: &Access<'_>) -> Result<Vec<Dependence>, DependenceTestFailure> {
        let n = self.levels.len();

        if first.subscripts.len() != second.subscripts.len() {
            log::debug!("{}: subscript counts differ, assuming any direction", first.array);
            return Ok(vec![self.dependence(first, second, vec![Direction::Star; n])]);
        }

        let mut names: Vec<String> = self.levels.iter().map(|iv| iv.name.clone()).collect();
        names.extend(self.levels.iter().map(|iv| format!("{}'", iv.name)));
        let renamed_first: Vec<AffineExpr> =
            first.subscripts.iter().map(|s| s.renamed(|v| self.column(v, i, false))).collect();
        let renamed_second: Vec<AffineExpr> =
            second.subscripts.iter().map(|s| s.renamed(|v| self.column(v, j, true))).collect();
        for expr in renamed_first.iter().chain(&renamed_second) {
            for var in expr.variables() {
                if !names.iter().any(|n| n == var) {
                    names.push(var.to_string());
                }
            }
        }

        let mut system = ConstraintSystem::new(names);
        for (a, b) in renamed_first.iter().zip(&renamed_second) {
            let difference = a.checked_sub(b).ok_or_else(|| self.overflow())?;
            let coeffs: Vec<i64> = system.names.iter().map(|name| difference.coefficient(name)).collect();
            let constant = difference.constant.checked_neg().ok_or_else(|| self.overflow())?;
            if !gcd_test(&coeffs, constant) {
                log::trace!("{}: gcd test proves independence of {} = {}", first.array, a, b);
                return Ok(Vec::new());
            }
            system.add_equality(coeffs, constant).ok_or_else(|| self.overflow())?;
        }
        for (level, iv) in self.levels.iter().enumerate() {
            system.add_range(level, iv.lower, iv.upper).ok_or_else(|| self.overflow())?;
            system.add_range(n + level, iv.lower, iv.upper).ok_or_else(|| self.overflow())?;
        }
        log::trace!("dependence system for {}:\n{}", first.array, system);

        if !self.fm.is_feasible(&system)? {
            return Ok(Vec::new());
        }

        let mut vectors = Vec::new();
        self.refine(&system, 0, &mut Vec::with_capacity(n), &mut vectors)?;

        let mut result = Vec::new();
        for vector in vectors {
            match vector.iter().find(|d| **d != Direction::Eq) {
                Some(Direction::Gt) => {
                    let reversed = vector.iter().map(Direction::reversed).collect();
                    result.push(self.dependence(second, first, reversed));
                }
                Some(_) => result.push(self.dependence(first, second, vector)),
                // Same iteration: textual order decides, and an access
                // never depends on itself
                None if i != j => result.push(self.dependence(first, second, vector)),
                None => {}
            }
        }
        Ok(result)
    }

    /// Enumerate the feasible `<`/`=`/`>` choices level by level.
    fn refine(
        &self,
        system: &ConstraintSystem,
        level: usize,
        prefix: &mut Vec<Direction>,
        out: &mut Vec<Vec<Direction>>,
    ) -> Result<(), DependenceTestFailure> {
        let n = self.levels.len();
        if level == n {
            out.push(prefix.clone());
            return Ok(());
        }
        if self.ctx.is_cancelled() {
            return Err(cancelled());
        }

        let vars = system.n_vars();
        let (src, snk) = (level, n + level);
        // Directions follow execution order, which runs against the index
        // value on a level counting down
        let (earlier, later) = if self.levels[level].descending { (snk, src) } else { (src, snk) };
        for direction in [Direction::Lt, Direction::Eq, Direction::Gt] {
            let mut refined = system.clone();
            match direction {
                Direction::Lt => refined.add(Constraint::difference(earlier, later, -1, vars)),
                Direction::Gt => refined.add(Constraint::difference(later, earlier, -1, vars)),
                _ => {
                    refined.add(Constraint::difference(src, snk, 0, vars));
                    refined.add(Constraint::difference(snk, src, 0, vars));
                }
            }
            if self.fm.is_feasible(&refined)? {
                prefix.push(direction);
                self.refine(&refined, level + 1, prefix, out)?;
                prefix.pop();
            }
        }
        Ok(())
    }

    fn dependence(&self, source: &Access<'_>, sink: &Access<'_>, direction: Vec<Direction>) -> Dependence {
        Dependence {
            source: source.stmt,
            sink: sink.stmt,
            source_access: source.expr.id,
            sink_access: sink.expr.id,
            kind: DependenceKind::between(source.is_write, sink.is_write),
            array: source.array.clone(),
            direction,
            line: source.expr.span.start_line,
        }
    }
}

/// Repeatedly merge dependences between the same accesses whose vectors
/// differ in exactly one position.
fn merge_directions(mut dependences: Vec<Dependence>) -> Vec<Dependence> {
    loop {
        let mut merged = None;
        'search: for (a, first) in dependences.iter().enumerate() {
            for (b, second) in dependences.iter().enumerate().skip(a + 1) {
                if first.source_access != second.source_access
                    || first.sink_access != second.sink_access
                    || first.kind != second.kind
                    || first.direction.len() != second.direction.len()
                {
                    continue;
                }
                let differing: Vec<usize> = (0..first.direction.len())
                    .filter(|&k| first.direction[k] != second.direction[k])
                    .collect();
                if let [k] = differing.as_slice() {
                    merged = Some((a, b, *k));
                    break 'search;
                }
            }
        }
        let Some((a, b, k)) = merged else {
            return dependences;
        };
        let removed = dependences.remove(b);
        let kept = &mut dependences[a];
        kept.direction[k] = kept.direction[k].union(&removed.direction[k]);
        log::trace!("merged direction vectors into ({})", format_direction(&kept.direction));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AnalysisConfig;
    use crate::frontend::parse;

    fn analyze(source: &str) -> Result<DependenceAnalysis, DependenceTestFailure> {
        let unit = parse(source).unwrap();
        let ctx = RefactoringContext::new(&unit);
        let outer = ctx.index().for_loops()[0];
        DependenceAnalysis::analyze(&ctx, outer)
    }

    fn directions(analysis: &DependenceAnalysis) -> Vec<String> {
        analysis.dependences().iter().map(|d| format_direction(&d.direction)).collect()
    }

    #[test]
    fn test_gcd_test() {
        assert!(!gcd_test(&[2, -2], 1));
        assert!(gcd_test(&[2, -2], 0));
        assert!(gcd_test(&[3, -6], 9));
        assert!(!gcd_test(&[3, -6], 10));
        assert!(!gcd_test(&[0, 0], 1));
    }

    #[test]
    fn test_direction_union() {
        assert_eq!(Direction::Lt.union(&Direction::Eq), Direction::Le);
        assert_eq!(Direction::Gt.union(&Direction::Eq), Direction::Ge);
        assert_eq!(Direction::Lt.union(&Direction::Gt), Direction::Star);
        assert_eq!(Direction::Le.union(&Direction::Lt), Direction::Le);
        assert_eq!(Direction::Le.union(&Direction::Gt), Direction::Star);
    }

    #[test]
    fn test_valid_direction() {
        use Direction::*;
        assert!(is_valid_direction(&[Eq, Eq]));
        assert!(is_valid_direction(&[Eq, Lt]));
        assert!(is_valid_direction(&[Star, Gt]));
        assert!(!is_valid_direction(&[Eq, Gt, Lt]));
        assert_eq!(swapped(&[Lt, Gt], 0, 1), vec![Gt, Lt]);
    }

    #[test]
    fn test_same_iteration_self_dependence() {
        let analysis = analyze("void f(double a[10]) { for (int i = 0; i < 10; i++) a[i] = a[i] + 1; }").unwrap();
        assert_eq!(directions(&analysis), vec!["="]);
        assert_eq!(analysis.dependences()[0].kind, DependenceKind::Anti);
        assert!(!analysis.has_level1_carried_dependence());
    }

    #[test]
    fn test_carried_flow_dependence() {
        let analysis = analyze("void f(double a[10]) { for (int i = 1; i < 10; i++) a[i] = a[i - 1] * 2; }").unwrap();
        assert_eq!(directions(&analysis), vec!["<"]);
        assert_eq!(analysis.dependences()[0].kind, DependenceKind::Flow);
        assert!(analysis.has_level1_carried_dependence());
    }

    #[test]
    fn test_transpose_blocks_interchange() {
        let source = "void f(double A[10][10]) { for (i = 0; i < 10; i++) for (j = 0; j < 10; j++) A[i][j] = A[j][i]; }";
        let analysis = analyze(source).unwrap();
        assert!(directions(&analysis).iter().any(|d| d == "<, >"));
        assert!(analysis.dependences().iter().any(|d| d.is_loop_carried()));
        assert!(!analysis.is_interchange_valid(1));
    }

    #[test]
    fn test_counting_down_level_follows_execution_order() {
        // Iteration i writes A[i][j]; the later iteration i - 1 reads it back
        let source = "void f(double A[10][10]) { for (int i = 8; i >= 1; i--) for (int j = 1; j < 9; j++) A[i][j] = A[i + 1][j + 1]; }";
        let analysis = analyze(source).unwrap();
        assert_eq!(directions(&analysis), vec!["<, >"]);
        assert_eq!(analysis.dependences()[0].kind, DependenceKind::Flow);
        assert!(analysis.has_level1_carried_dependence());
        assert!(!analysis.is_interchange_valid(1));
    }

    #[test]
    fn test_independent_accesses() {
        // Even and odd elements never meet
        let analysis = analyze("void f(int a[40]) { for (int i = 0; i < 10; i++) a[2*i] = a[2*i + 1]; }").unwrap();
        assert!(analysis.dependences().is_empty());
        // Disjoint ranges
        let analysis = analyze("void f(int a[40]) { for (int i = 0; i < 10; i++) a[i] = a[i + 20]; }").unwrap();
        assert!(analysis.dependences().is_empty());
    }

    #[test]
    fn test_scalar_subscript_write_is_carried() {
        let analysis = analyze("void f(int a[40]) { for (int i = 0; i < 10; i++) a[0] = a[0] + i; }").unwrap();
        assert!(analysis.dependences().iter().any(|d| d.kind == DependenceKind::Output));
        assert!(analysis.has_level1_carried_dependence());
    }

    #[test]
    fn test_loop_invariant_symbol_is_shared() {
        let analysis = analyze("void f(int a[40], int k) { for (int i = 0; i < 10; i++) a[i + k] = a[i + k] * 3; }").unwrap();
        assert!(!analysis.has_level1_carried_dependence());
    }

    #[test]
    fn test_interchange_legal_for_uniform_stencil() {
        let source = "void f(double A[10][10]) { for (i = 1; i < 10; i++) for (j = 1; j < 10; j++) A[i][j] = A[i-1][j-1]; }";
        let analysis = analyze(source).unwrap();
        assert_eq!(directions(&analysis), vec!["<, <"]);
        assert!(analysis.is_interchange_valid(1));
        assert!(analysis.is_fully_permutable(1));
    }

    #[test]
    fn test_failures() {
        let err = analyze("void f(int n, int a[10]) { for (int i = 0; i < n; i++) a[i] = a[i]; }").unwrap_err();
        assert_eq!(err.kind, DependenceFailureKind::UnsupportedLoopHeader);
        let err = analyze("void f(int a[10]) { for (int i = 0; i < 10; i++) a[i*i] = a[i]; }").unwrap_err();
        assert_eq!(err.kind, DependenceFailureKind::NonAffineSubscript);
        let err = analyze("void f(int a[10]) { for (int i = 0; i < 10; i++) { x = 0; for (int j = 0; j < 2; j++) a[j] = 0; } }")
            .unwrap_err();
        assert_eq!(err.kind, DependenceFailureKind::ImperfectNest);
        let err = analyze("void f(int a[10]) { for (int i = 0; i < 10; i++) { if (a[i]) break; } }").unwrap_err();
        assert_eq!(err.kind, DependenceFailureKind::UnsupportedControlFlow);
    }

    #[test]
    fn test_merged_directions() {
        let unit = parse("void f(double A[10][10]) { for (i = 1; i < 10; i++) for (j = 0; j < 10; j++) A[i][j] = A[i-1][0]; }").unwrap();
        let ctx = RefactoringContext::new(&unit).with_config(AnalysisConfig { merge_directions: true, ..Default::default() });
        let outer = ctx.index().for_loops()[0];
        let analysis = DependenceAnalysis::analyze(&ctx, outer).unwrap();
        assert_eq!(directions(&analysis), vec!["<, ≤"]);
    }

    #[test]
    fn test_cancellation() {
        let unit = parse("void f(int a[10]) { for (int i = 0; i < 10; i++) a[i] = a[i]; }").unwrap();
        let ctx = RefactoringContext::new(&unit);
        ctx.cancellation().cancel();
        let outer = ctx.index().for_loops()[0];
        let err = DependenceAnalysis::analyze(&ctx, outer).unwrap_err();
        assert_eq!(err.kind, DependenceFailureKind::Cancelled);
    }
}
