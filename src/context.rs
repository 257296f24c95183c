//! Per-request state shared by every check and executor.

use crate::analysis::constant::{ConstantOracle, ConstantPropagator};
use crate::analysis::loops::{LoopCache, LoopInspector};
use crate::frontend::ast::{Function, Stmt, TranslationUnit};
use crate::frontend::index::AstIndex;
use crate::frontend::resolve::Bindings;
use crate::polyhedral::DEFAULT_MAX_ROWS;
use crate::utils::cancel::CancellationToken;
use crate::utils::location::{SourceMap, Span};
use serde::{Deserialize, Serialize};

/// Analysis tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Row limit for Fourier-Motzkin elimination before the dependence test
    /// gives up
    pub max_rows: usize,
    /// Merge direction vectors that differ in one position into
    /// `<=`/`>=`/`*` summaries
    pub merge_directions: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self { max_rows: DEFAULT_MAX_ROWS, merge_directions: false }
    }
}

/// Everything one refactoring request needs about the unit it works on.
///
/// The loop cache is owned by the context and dropped with it.
pub struct RefactoringContext<'a> {
    index: AstIndex<'a>,
    bindings: Bindings,
    oracle: Box<dyn ConstantOracle + 'a>,
    loops: LoopCache,
    config: AnalysisConfig,
    cancellation: CancellationToken,
}

impl<'a> RefactoringContext<'a> {
    /// Index `unit` and build the default constant oracle.
    pub fn new(unit: &'a TranslationUnit) -> Self {
        let bindings = Bindings::resolve(unit);
        let oracle = ConstantPropagator::new(unit, &bindings);
        log::debug!("indexed {} functions, {} bindings", unit.functions.len(), bindings.len());
        Self {
            index: AstIndex::new(unit),
            bindings,
            oracle: Box::new(oracle),
            loops: LoopCache::new(),
            config: AnalysisConfig::default(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the constant oracle.
    pub fn with_oracle(mut self, oracle: impl ConstantOracle + 'a) -> Self {
        self.oracle = Box::new(oracle);
        self.loops = LoopCache::new();
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn index(&self) -> &AstIndex<'a> {
        &self.index
    }

    pub fn unit(&self) -> &'a TranslationUnit {
        self.index.unit()
    }

    pub fn source(&self) -> &'a SourceMap {
        self.index.source()
    }

    /// Raw source text of `span`.
    pub fn text(&self, span: &Span) -> &'a str {
        self.index.text(span)
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub fn oracle(&self) -> &dyn ConstantOracle {
        self.oracle.as_ref()
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn loops(&self) -> &LoopCache {
        &self.loops
    }

    /// The function containing `stmt`.
    pub fn scope_of(&self, stmt: &Stmt) -> Option<&'a Function> {
        self.index.enclosing_function(stmt.id)
    }

    /// Inspect a `for` statement.
    pub fn inspect(&self, stmt: &'a Stmt) -> Option<LoopInspector<'_, 'a>> {
        LoopInspector::new(self, stmt)
    }

    /// The outermost `for` statement starting on `line`.
    pub fn loop_at_line(&self, line: usize) -> Option<&'a Stmt> {
        self.index.for_loop_at_line(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parse;
    use crate::frontend::ast::Expr;

    struct Fixed(i64);

    impl ConstantOracle for Fixed {
        fn evaluate(&self, expr: &Expr, _scope: Option<&Function>) -> Option<i64> {
            expr.as_int_literal().or(Some(self.0))
        }
    }

    #[test]
    fn test_custom_oracle_resolves_symbolic_bound() {
        let unit = parse("void f(int n) {\nfor (int i = 0; i < n; i++) ;\n}").unwrap();
        let ctx = RefactoringContext::new(&unit);
        let stmt = ctx.loop_at_line(2).unwrap();
        assert_eq!(ctx.inspect(stmt).unwrap().inclusive_upper_bound(), None);

        let ctx = RefactoringContext::new(&unit).with_oracle(Fixed(16));
        assert_eq!(ctx.inspect(stmt).unwrap().inclusive_upper_bound(), Some(15));
        assert_eq!(ctx.scope_of(stmt).map(|f| f.name.as_str()), Some("f"));
    }
}
