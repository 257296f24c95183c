//! Loop refactorings.
//!
//! Each refactoring checks its request in three phases (parameters, loop
//! form, dependences) and then computes text edits. [`check`] always runs
//! every phase so the caller sees the fullest status report; [`perform`]
//! refuses to change anything once an error is present.

pub mod interchange;
pub mod fusion;
pub mod unrolling;
pub mod strip_mining;
pub mod tiling;
pub mod parallel;

pub use interchange::Interchange;
pub use fusion::Fusion;
pub use unrolling::Unrolling;
pub use strip_mining::StripMining;
pub use tiling::Tiling;
pub use parallel::{Parallelize, ParallelKind};

use crate::analysis::dependence::DependenceAnalysis;
use crate::analysis::loops::first_jump;
use crate::context::RefactoringContext;
use crate::frontend::ast::*;
use crate::frontend::resolve::Binding;
use crate::utils::errors::{DependenceFailureKind, LoopForgeError};
use crate::utils::location::SourceMap;
use crate::utils::rewrite::SourceEdits;
use crate::utils::status::RefactoringStatus;
use std::collections::HashSet;

/// A checked, text-producing loop transformation.
pub trait Refactoring<'a> {
    /// Get transformation name.
    fn name(&self) -> &'static str;

    /// Validate the request parameters before any analysis.
    fn check_parameters(&self, ctx: &RefactoringContext<'a>, status: &mut RefactoringStatus);

    /// Validate the shape of the selected loop (nest).
    fn check_loop_form(&self, ctx: &RefactoringContext<'a>, status: &mut RefactoringStatus);

    /// Validate that the transformation preserves every dependence.
    fn check_dependences(&self, _ctx: &RefactoringContext<'a>, _status: &mut RefactoringStatus) {}

    /// Compute the edits. Only called after the checks passed.
    fn change(&self, ctx: &RefactoringContext<'a>, edits: &mut SourceEdits) -> Result<(), LoopForgeError>;
}

/// Run every check phase and aggregate the status.
pub fn check<'a, R: Refactoring<'a> + ?Sized>(refactoring: &R, ctx: &RefactoringContext<'a>) -> RefactoringStatus {
    let mut status = RefactoringStatus::new();
    refactoring.check_parameters(ctx, &mut status);
    refactoring.check_loop_form(ctx, &mut status);
    refactoring.check_dependences(ctx, &mut status);
    log::info!("{} check: {}", refactoring.name(), status.severity());
    status
}

/// A successful refactoring: the status it passed with and its edits.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub status: RefactoringStatus,
    pub edits: SourceEdits,
}

impl Outcome {
    /// Splice the edits into `source`.
    pub fn apply(&self, source: &str) -> Result<String, LoopForgeError> {
        Ok(self.edits.finalize(source)?)
    }
}

/// Check, then compute the edits.
///
/// Refuses when the status holds an error or fatal error, and when the
/// request was cancelled before text generation.
pub fn perform<'a, R: Refactoring<'a> + ?Sized>(
    refactoring: &R,
    ctx: &RefactoringContext<'a>,
) -> Result<Outcome, LoopForgeError> {
    let status = check(refactoring, ctx);
    execute(refactoring, ctx, status)
}

/// Compute the edits for a refactoring whose checks produced `status`.
pub fn execute<'a, R: Refactoring<'a> + ?Sized>(
    refactoring: &R,
    ctx: &RefactoringContext<'a>,
    status: RefactoringStatus,
) -> Result<Outcome, LoopForgeError> {
    if status.has_error() {
        return Err(LoopForgeError::Refused(status.to_string()));
    }
    if ctx.is_cancelled() {
        return Err(LoopForgeError::Cancelled);
    }
    let mut edits = SourceEdits::new();
    refactoring.change(ctx, &mut edits)?;
    log::debug!("{}: {} edits", refactoring.name(), edits.len());
    Ok(Outcome { status, edits })
}

/// FATAL when the loop body contains `break`, `continue`, `goto` or
/// `return`.
pub(crate) fn check_no_jumps(ctx: &RefactoringContext<'_>, stmt: &Stmt, status: &mut RefactoringStatus) {
    if let Some(body) = stmt.as_for().map(|f| f.body) {
        if let Some(jump) = first_jump(body) {
            status.add_fatal_error_at(
                format!(
                    "Loop contains an unsupported jump statement: '{}' (line {})",
                    ctx.text(&jump.span).trim(),
                    jump.span.start_line
                ),
                jump.span,
            );
        }
    }
}

/// Run dependence analysis, turning a failure into a FATAL entry.
pub(crate) fn analyze_or_report(
    ctx: &RefactoringContext<'_>,
    outer: &Stmt,
    status: &mut RefactoringStatus,
) -> Option<DependenceAnalysis> {
    match DependenceAnalysis::analyze(ctx, outer) {
        Ok(analysis) => Some(analysis),
        Err(failure) if failure.kind == DependenceFailureKind::Cancelled => {
            status.add_fatal_error("Refactoring cancelled during dependence analysis");
            None
        }
        Err(failure) => {
            log::debug!("dependence analysis failed: {:?}", failure);
            status.add_fatal_error(format!("Dependences could not be analyzed: {}", failure));
            None
        }
    }
}

/// The binding of a loop's index variable.
pub(crate) fn index_binding(ctx: &RefactoringContext<'_>, stmt: &Stmt) -> Option<Binding> {
    let init = stmt.as_for()?.init?;
    match &init.kind {
        StmtKind::Decl(decl) => decl.declarators.first().map(crate::frontend::resolve::Bindings::declared),
        StmtKind::Expr(expr) => {
            let (_, lhs, _) = expr.as_assignment()?;
            ctx.bindings().binding_of(lhs.unparen()).cloned()
        }
        _ => None,
    }
}

/// True when the loop declares its index in the initializer.
pub(crate) fn declares_index(stmt: &Stmt) -> bool {
    matches!(stmt.as_for().and_then(|f| f.init).map(|s| &s.kind), Some(StmtKind::Decl(_)))
}

/// Type spelling of a declared index, `int` otherwise.
pub(crate) fn index_type(stmt: &Stmt) -> String {
    match stmt.as_for().and_then(|f| f.init).map(|s| &s.kind) {
        Some(StmtKind::Decl(decl)) => decl.specifiers.clone(),
        _ => "int".to_string(),
    }
}

/// Raw text of `span` with every occurrence of `binding` inside `within`
/// replaced by `replacement`.
pub(crate) fn substitute(
    ctx: &RefactoringContext<'_>,
    within: &Stmt,
    span: crate::utils::location::Span,
    binding: &Binding,
    replacement: &str,
) -> String {
    let text = ctx.text(&span);
    let mut occurrences: Vec<&Expr> = ctx
        .bindings()
        .occurrences(within, binding)
        .into_iter()
        .filter(|e| span.encloses(&e.span))
        .collect();
    occurrences.sort_by_key(|e| std::cmp::Reverse(e.span.start_offset));

    let mut out = text.to_string();
    for occurrence in occurrences {
        let start = occurrence.span.start_offset - span.start_offset;
        let end = occurrence.span.end_offset - span.start_offset;
        if out.is_char_boundary(start) && end <= out.len() && out.is_char_boundary(end) {
            out.replace_range(start..end, replacement);
        }
    }
    out
}

/// Span from the first to the last statement of a loop body (the body
/// itself when it is not a compound).
pub(crate) fn body_contents_span(body: &Stmt) -> Option<crate::utils::location::Span> {
    match &body.kind {
        StmtKind::Compound(stmts) => {
            let first = stmts.first()?;
            let last = stmts.last()?;
            Some(first.span.merge(&last.span))
        }
        _ => Some(body.span),
    }
}

/// Every name declared or used in `func`.
pub(crate) fn names_in(func: &Function) -> HashSet<String> {
    let mut names: HashSet<String> = collect_exprs(&func.body)
        .into_iter()
        .filter_map(|e| e.as_identifier().map(str::to_string))
        .collect();
    for stmt in collect_stmts(&func.body) {
        if let StmtKind::Decl(decl) = &stmt.kind {
            names.extend(decl.declarators.iter().map(|d| d.name.clone()));
        }
    }
    for param in &func.params {
        names.extend(param.declarators.iter().map(|d| d.name.clone()));
    }
    names
}

/// `base_0`, `base_1`, ... : the first not already used in `func`.
pub(crate) fn fresh_name(func: Option<&Function>, base: &str, taken: &HashSet<String>) -> String {
    let used = func.map(names_in).unwrap_or_default();
    (0..)
        .map(|n| format!("{}_{}", base, n))
        .find(|candidate| !used.contains(candidate) && !taken.contains(candidate))
        .unwrap_or_else(|| format!("{}_strip", base))
}

/// Byte range of the whole lines holding `first..=last`, including the
/// trailing newline.
pub(crate) fn line_range(source: &SourceMap, start: usize, end: usize) -> (usize, usize) {
    let line_start = source.line_start(start);
    let text = source.source();
    let line_end = text[end..].find('\n').map(|p| end + p + 1).unwrap_or(text.len());
    (line_start, line_end)
}

/// True when only whitespace precedes `offset` on its line.
pub(crate) fn starts_line(source: &SourceMap, offset: usize) -> bool {
    let start = source.line_start(offset);
    source.source()[start..offset].chars().all(|c| c == ' ' || c == '\t')
}

/// Insert `lines` (each without newline) on their own lines before `stmt`,
/// at the statement's indentation.
pub(crate) fn insert_lines_before(
    ctx: &RefactoringContext<'_>,
    stmt: &Stmt,
    lines: &[String],
    edits: &mut SourceEdits,
) -> Result<(), LoopForgeError> {
    if lines.is_empty() {
        return Ok(());
    }
    let source = ctx.source();
    let offset = stmt.span.start_offset;
    if starts_line(source, offset) {
        let indent = source.indentation_at(offset);
        let text: String = lines.iter().map(|l| format!("{}{}\n", indent, l)).collect();
        edits.insert(source.line_start(offset), text)?;
    } else {
        let indent = source.indentation_at(offset);
        let text: String = lines.iter().map(|l| format!("\n{}{}", indent, l)).collect();
        edits.insert(offset, format!("{}\n{}", text, indent))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parse;
    use crate::utils::status::Severity;

    #[test]
    fn test_check_runs_every_phase_after_a_fatal_error() {
        let source = "void f(int n, int a[10]) { for (i = 0; i < n; i++) a[i] = 0; }";
        let unit = parse(source).unwrap();
        let ctx = RefactoringContext::new(&unit);
        let target = ctx.index().for_loops()[0];

        let status = check(&unrolling::Unrolling::new(target, 0), &ctx);
        let fatal = status.messages(Severity::FatalError);
        assert!(fatal.contains(&"Unroll factor must be positive (got 0)"));
        assert!(fatal.contains(&"Upper bound is not a constant value."));
    }

    #[test]
    fn test_substitute_only_touches_binding() {
        let source = "void f(int a[10]) { for (int i = 0; i < 10; i++) a[i] = a[i] + i; }";
        let unit = parse(source).unwrap();
        let ctx = RefactoringContext::new(&unit);
        let stmt = ctx.index().for_loops()[0];
        let binding = index_binding(&ctx, stmt).unwrap();
        let body = stmt.as_for().unwrap().body;
        assert_eq!(substitute(&ctx, body, body.span, &binding, "(i + 1)"), "a[(i + 1)] = a[(i + 1)] + (i + 1);");
    }

    #[test]
    fn test_fresh_name_avoids_existing() {
        let unit = parse("void f() { int i_0; for (int i = 0; i < 4; i++) ; }").unwrap();
        let func = &unit.functions[0];
        assert_eq!(fresh_name(Some(func), "i", &HashSet::new()), "i_1");
    }

    #[test]
    fn test_insert_lines_before_keeps_indentation() {
        let source = "void f() {\n    for (i = 0; i < 4; i++) ;\n}\n";
        let unit = parse(source).unwrap();
        let ctx = RefactoringContext::new(&unit);
        let stmt = ctx.index().for_loops()[0];
        let mut edits = SourceEdits::new();
        insert_lines_before(&ctx, stmt, &["#pragma acc loop".to_string()], &mut edits).unwrap();
        assert_eq!(
            edits.finalize(source).unwrap(),
            "void f() {\n    #pragma acc loop\n    for (i = 0; i < 4; i++) ;\n}\n"
        );
    }
}
