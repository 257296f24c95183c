//! Loop tiling.
//!
//! Tiling strip-mines every loop of a perfect nest down to `depth` with the
//! same factor and moves all by-strip loops outside the in-strip loops, so
//! the nest walks square tiles of the iteration space:
//!
//! ```text
//! for (i = 0; i < N; i++)
//!   for (j = 0; j < M; j++)
//!     C[i][j] += A[i][j];
//! ```
//! becomes (factor 32, depth 1):
//! ```text
//! for (int i_0 = 0; i_0 < N; i_0 += 32)
//!     for (int j_0 = 0; j_0 < M; j_0 += 32)
//!         for (i = i_0; i < i_0 + 32 && i < N; i++)
//!   for (j = j_0; j < j_0 + 32 && j < M; j++)
//!     C[i][j] += A[i][j];
//! ```
//!
//! The reordering is only legal when the band is fully permutable, and the
//! strip loops can only be hoisted when no inner bound depends on an outer
//! index variable.

use crate::analysis::dependence::{format_direction, Direction};
use crate::analysis::loops::perfect_loop_nest_headers;
use crate::context::RefactoringContext;
use crate::frontend::ast::*;
use crate::transform::strip_mining::{check_strip_factor, HeaderParts};
use crate::transform::{analyze_or_report, check_no_jumps, fresh_name, Refactoring};
use crate::utils::errors::LoopForgeError;
use crate::utils::rewrite::SourceEdits;
use crate::utils::status::RefactoringStatus;
use std::collections::HashSet;

/// Square tiling of the band `0..=depth` of the nest rooted at `outer`.
#[derive(Debug, Clone)]
pub struct Tiling<'a> {
    pub outer: &'a Stmt,
    pub factor: i64,
    pub depth: usize,
}

impl<'a> Tiling<'a> {
    pub fn new(outer: &'a Stmt, factor: i64, depth: usize) -> Self {
        Self { outer, factor, depth }
    }

    /// The headers of the band, outermost first.
    pub fn band(&self) -> Vec<&'a Stmt> {
        perfect_loop_nest_headers(self.outer).into_iter().take(self.depth + 1).collect()
    }

    fn band_is_complete(&self) -> bool {
        perfect_loop_nest_headers(self.outer).len() > self.depth
    }
}

/// Every identifier named in a loop header.
fn header_identifiers(stmt: &Stmt) -> HashSet<&str> {
    let mut roots = own_exprs(stmt);
    if let Some(init) = stmt.as_for().and_then(|f| f.init) {
        roots.extend(own_exprs(init));
    }
    let mut names = HashSet::new();
    for root in roots {
        root.walk(&mut |e| {
            if let Some(name) = e.as_identifier() {
                names.insert(name);
            }
        });
    }
    names
}

impl<'a> Refactoring<'a> for Tiling<'a> {
    fn name(&self) -> &'static str {
        "Tile Loop Nest"
    }

    fn check_parameters(&self, ctx: &RefactoringContext<'a>, status: &mut RefactoringStatus) {
        if self.factor <= 0 {
            status.add_fatal_error(format!("Tile factor must be positive (got {})", self.factor));
            return;
        }
        let Some(inspector) = ctx.inspect(self.outer) else {
            status.add_fatal_error("Please select a for loop");
            return;
        };
        let levels = inspector.perfect_loop_nest_headers().len();
        if self.depth >= levels {
            status.add_fatal_error(format!(
                "Depth {} is outside the perfect loop nest ({} levels)",
                self.depth, levels
            ));
            return;
        }
        for level in 0..=self.depth {
            check_strip_factor(self.factor, inspector.iteration_factor_at(level), level, status);
        }
    }

    fn check_loop_form(&self, ctx: &RefactoringContext<'a>, status: &mut RefactoringStatus) {
        if !self.band_is_complete() {
            return;
        }
        check_no_jumps(ctx, self.outer, status);

        let mut outer_indices: Vec<String> = Vec::new();
        for (level, header) in self.band().into_iter().enumerate() {
            let counted = ctx.inspect(header).map_or(false, |l| l.is_counted_loop());
            let Some(parts) = HeaderParts::of(ctx, header).filter(|_| counted) else {
                status.add_fatal_error(format!(
                    "The loop at depth {} must be a counted loop of the form 'for (i = LB; i < UB; i += S)'",
                    level
                ));
                continue;
            };
            let names = header_identifiers(header);
            if let Some(outer) = outer_indices.iter().find(|index| names.contains(index.as_str())) {
                status.add_fatal_error(format!(
                    "Tiling requires rectangular bounds, but the loop at depth {} depends on '{}'",
                    level, outer
                ));
            }
            outer_indices.push(parts.index);
        }
    }

    fn check_dependences(&self, ctx: &RefactoringContext<'a>, status: &mut RefactoringStatus) {
        if self.factor <= 0 || !self.band_is_complete() {
            return;
        }
        let Some(analysis) = analyze_or_report(ctx, self.outer, status) else {
            return;
        };
        if !analysis.is_fully_permutable(self.depth) {
            let offending = analysis.dependences().iter().find(|d| {
                !d.direction
                    .iter()
                    .take(self.depth + 1)
                    .all(|dir| matches!(dir, Direction::Eq | Direction::Lt | Direction::Le))
            });
            let detail = offending
                .map(|d| format!("{} dir=({})", d.array, format_direction(&d.direction)))
                .unwrap_or_default();
            status.add_error(format!(
                "The loops down to depth {} are not fully permutable: {}",
                self.depth, detail
            ));
        }
    }

    fn change(&self, ctx: &RefactoringContext<'a>, edits: &mut SourceEdits) -> Result<(), LoopForgeError> {
        let band = self.band();
        let parts = band
            .iter()
            .map(|header| HeaderParts::of(ctx, header))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| LoopForgeError::Refused("Loop header is not supported".to_string()))?;

        let scope = ctx.scope_of(self.outer);
        let mut taken = HashSet::new();
        let strips: Vec<String> = parts
            .iter()
            .map(|p| {
                let name = fresh_name(scope, &p.index, &taken);
                taken.insert(name.clone());
                name
            })
            .collect();

        let indent = ctx.source().indentation_at(self.outer.span.start_offset);
        let mut lines: Vec<String> = parts
            .iter()
            .zip(&strips)
            .map(|(p, strip)| p.by_strip(strip, self.factor))
            .collect();
        lines.push(parts[0].in_strip(&strips[0], self.factor));
        let head = lines
            .iter()
            .enumerate()
            .map(|(n, line)| if n == 0 { line.clone() } else { format!("{}{}{}", indent, "    ".repeat(n), line) })
            .collect::<Vec<_>>()
            .join("\n");

        for (level, header) in band.iter().enumerate() {
            let Some(for_loop) = header.as_for() else {
                continue;
            };
            let text = if level == 0 { head.clone() } else { parts[level].in_strip(&strips[level], self.factor) };
            edits.replace(for_loop.header_span.start_offset, for_loop.header_span.len(), text)?;
        }
        log::debug!("tiled {} loops with strip variables {}", band.len(), strips.join(", "));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parse;
    use crate::transform::{check, perform};
    use crate::utils::status::Severity;

    #[test]
    fn test_tile_two_levels() {
        let source = "void f(int N, int M) {\n  for (i = 0; i < N; i++)\n    for (j = 0; j < M; j++)\n      C[i][j] += A[i][j];\n}\n";
        let unit = parse(source).unwrap();
        let ctx = RefactoringContext::new(&unit);
        let outcome = perform(&Tiling::new(ctx.index().for_loops()[0], 32, 1), &ctx).unwrap();
        assert_eq!(
            outcome.apply(source).unwrap(),
            "void f(int N, int M) {\n  for (int i_0 = 0; i_0 < N; i_0 += 32)\n      for (int j_0 = 0; j_0 < M; j_0 += 32)\n          for (i = i_0; i < i_0 + 32 && i < N; i++)\n    for (j = j_0; j < j_0 + 32 && j < M; j++)\n      C[i][j] += A[i][j];\n}\n"
        );
    }

    #[test]
    fn test_triangular_bounds_rejected() {
        let source = "void f(int N) { for (i = 0; i < N; i++) for (j = 0; j < i; j++) a[i][j] = 0; }";
        let unit = parse(source).unwrap();
        let ctx = RefactoringContext::new(&unit);
        let status = check(&Tiling::new(ctx.index().for_loops()[0], 4, 1), &ctx);
        assert!(status.mentions("rectangular bounds"));
    }

    #[test]
    fn test_non_permutable_band_rejected() {
        let source = "void f() { for (i = 1; i < 10; i++) for (j = 0; j < 9; j++) a[i][j] = a[i - 1][j + 1]; }";
        let unit = parse(source).unwrap();
        let ctx = RefactoringContext::new(&unit);
        let status = check(&Tiling::new(ctx.index().for_loops()[0], 4, 1), &ctx);
        assert_eq!(status.severity(), Severity::Error);
        assert!(status.mentions("not fully permutable"));
    }

    #[test]
    fn test_depth_and_factor_checked_per_level() {
        let source = "void f() { for (i = 0; i < 16; i++) for (j = 0; j < 16; j += 4) a[i][j] = 0; }";
        let unit = parse(source).unwrap();
        let ctx = RefactoringContext::new(&unit);
        let outer = ctx.index().for_loops()[0];
        assert!(check(&Tiling::new(outer, 4, 1), &ctx).mentions("must be greater than the iteration factor 4"));
        assert!(!check(&Tiling::new(outer, 8, 1), &ctx).has_error());
        assert!(check(&Tiling::new(outer, 8, 2), &ctx).mentions("outside the perfect loop nest"));
    }
}
