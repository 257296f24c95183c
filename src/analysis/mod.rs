//! Analyses over C loop nests.

pub mod affine;
pub mod constant;
pub mod patterns;
pub mod induction;
pub mod loops;
pub mod dependence;

pub use affine::AffineExpr;
pub use constant::{ConstantOracle, ConstantPropagator};
pub use patterns::{is_counted_loop, match_counted_loop, COUNTED_LOOP_PATTERNS};
pub use induction::InductionVariable;
pub use loops::{LoopCache, LoopHeader, LoopInspector};
pub use dependence::{Dependence, DependenceAnalysis, DependenceKind, Direction};

use crate::context::RefactoringContext;
use crate::frontend::ast::Stmt;
use crate::utils::errors::DependenceTestFailure;

/// Analyze dependences in the perfect nest rooted at `outer`.
pub fn analyze_dependences(ctx: &RefactoringContext<'_>, outer: &Stmt) -> Result<DependenceAnalysis, DependenceTestFailure> {
    DependenceAnalysis::analyze(ctx, outer)
}
