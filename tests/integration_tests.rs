//! Integration tests for the refactoring pipeline.

use loopforge::analysis::patterns::COUNTED_LOOP_PATTERNS;
use loopforge::analysis::{is_counted_loop, AffineExpr};
use loopforge::frontend::{parse_expression, parse_statement};
use loopforge::prelude::*;
use loopforge::refactor;
use loopforge::transform::fusion::headers_unify;
use loopforge::utils::SourceMap;

fn with_context<T>(source: &str, f: impl FnOnce(&RefactoringContext<'_>) -> T) -> T {
    let unit = parse(source).expect("Failed to parse");
    let ctx = RefactoringContext::new(&unit);
    f(&ctx)
}

#[test]
fn test_catalog_headers_are_counted_loops() {
    assert!(!COUNTED_LOOP_PATTERNS.is_empty());
    for pattern in COUNTED_LOOP_PATTERNS.iter() {
        let text = pattern.text.replace("LB", "0").replace("UB", "n");
        let stmt = parse_statement(&text).expect("catalog entry parses");
        assert!(is_counted_loop(&stmt), "{} should be a counted loop", text);
    }

    for text in [
        "for (i = 0; i != n; i++) ;",
        "for (i = 0; i > n; i++) ;",
        "for (i = 0; i < n; i += k) ;",
        "for (i = 0; i < n; i--) ;",
        "for (i = 0; j < n; i++) ;",
    ] {
        let stmt = parse_statement(text).unwrap();
        assert!(!is_counted_loop(&stmt), "{} should not be a counted loop", text);
    }
}

#[test]
fn test_perfect_nesting() {
    let source = r#"
        void f(int a[8][8], int x) {
            for (int i = 0; i < 8; i++) {
                x = i;
                for (int j = 0; j < 8; j++)
                    a[i][j] = x;
            }
            for (int i = 0; i < 8; i++)
                a[i][0] = 0;
            for (int i = 0; i < 8; i++) {
                for (int j = 0; j < 8; j++)
                    a[i][j] = 0;
            }
        }
    "#;
    with_context(source, |ctx| {
        let loops = ctx.index().for_loops();
        let imperfect = ctx.inspect(loops[0]).unwrap();
        assert!(!imperfect.is_perfect_loop_nest());
        assert!(!imperfect.is_perfect_loop_nest_to(1));

        let flat = ctx.inspect(loops[2]).unwrap();
        assert!(flat.is_perfect_loop_nest());
        assert!(!flat.is_perfect_loop_nest_to(1));

        let nest = ctx.inspect(loops[3]).unwrap();
        assert!(nest.is_perfect_loop_nest_to(1));
        assert_eq!(nest.perfect_loop_nest_headers().len(), 2);
    });
}

#[test]
fn test_affine_index_model() {
    let text = "2*i + j - 3";
    let e = AffineExpr::parse(&parse_expression(text).unwrap(), &SourceMap::new(text.to_string())).unwrap();
    assert_eq!(e.constant, -3);
    assert_eq!(e.coefficient("i"), 2);
    assert_eq!(e.coefficient("j"), 1);

    let text = "i - (j + 1)";
    let e = AffineExpr::parse(&parse_expression(text).unwrap(), &SourceMap::new(text.to_string())).unwrap();
    assert_eq!(e.constant, -1);
    assert_eq!(e.coefficient("i"), 1);
    assert_eq!(e.coefficient("j"), -1);

    let text = "i * j";
    let err = AffineExpr::parse(&parse_expression(text).unwrap(), &SourceMap::new(text.to_string())).unwrap_err();
    assert!(err.to_string().contains("i * j"));
}

#[test]
fn test_transpose_blocks_interchange() {
    let source = "void f() {\n  for (i = 0; i < 10; i++)\n    for (j = 0; j < 10; j++)\n      A[i][j] = A[j][i];\n}\n";
    with_context(source, |ctx| {
        let outer = ctx.loop_at_line(2).unwrap();
        let analysis = DependenceAnalysis::analyze(ctx, outer).unwrap();
        assert!(analysis
            .dependences()
            .iter()
            .any(|d| d.direction.iter().any(|dir| *dir != Direction::Eq)));
        assert!(!analysis.is_interchange_valid(1));

        let status = check(&Interchange::new(outer, 1), ctx);
        assert_eq!(status.severity(), Severity::Error);
    });
}

#[test]
fn test_self_dependence_is_parallelizable() {
    let source = "void f(int a[10]) {\n  for (i = 0; i < 10; i++)\n    a[i] = a[i] + 1;\n}\n";
    with_context(source, |ctx| {
        let target = ctx.loop_at_line(2).unwrap();
        let analysis = DependenceAnalysis::analyze(ctx, target).unwrap();
        assert!(!analysis.dependences().is_empty());
        assert!(!analysis.has_level1_carried_dependence());
        assert!(!check(&Parallelize::parallel(target), ctx).has_error());
    });
}

#[test]
fn test_strip_mine_factor_rules() {
    let source = "void f(int a[64]) {\n  for (i = 0; i < 64; i += 2)\n    a[i] = 0;\n}\n";
    with_context(source, |ctx| {
        let target = ctx.loop_at_line(2).unwrap();
        assert_eq!(ctx.inspect(target).unwrap().iteration_factor(), Some(2));
        assert!(!check(&StripMining::new(target, 4, 0), ctx).has_error());
        assert!(check(&StripMining::new(target, 3, 0), ctx).has_fatal_error());
        assert!(check(&StripMining::new(target, 1, 0), ctx).has_fatal_error());
    });
}

#[test]
fn test_unroll_needs_constant_upper_bound() {
    let source = "void f(int n, int a[10]) {\n  for (i = 0; i < n; i++)\n    a[i] = 0;\n}\n";
    with_context(source, |ctx| {
        let target = ctx.loop_at_line(2).unwrap();
        let status = check(&Unrolling::new(target, 2), ctx);
        assert!(status.messages(Severity::FatalError).contains(&"Upper bound is not a constant value."));
        assert!(matches!(perform(&Unrolling::new(target, 2), ctx), Err(LoopForgeError::Refused(_))));
    });
}

#[test]
fn test_named_constant_bound_unrolls() {
    let source = "void f(int a[10]) {\n  const int N = 6;\n  for (int i = 0; i < N; i++)\n    a[i] = i;\n}\n";
    let request = RefactoringRequest::new(3, RefactoringKind::Unroll { factor: 3 });
    let outcome = refactor(source, &request, false).unwrap();
    let rewritten = outcome.source.unwrap();
    assert!(rewritten.contains("for (int i = 0; i < 6; i += 3) {"));
    assert!(rewritten.contains("a[(i + 2)] = (i + 2);"));
}

#[test]
fn test_fusion_unifies_renamed_headers() {
    let source = "void f(int a[10], int b[10]) {\n  for (i = 0; i < 10; i++)\n    a[i] = 1;\n  for (k = 0; k < 10; k++)\n    b[k] = a[k];\n}\n";
    with_context(source, |ctx| {
        let loops = ctx.index().for_loops();
        assert!(headers_unify(loops[0], loops[1]));

        let outcome = perform(&Fusion::new(loops[0]), ctx).unwrap();
        assert_eq!(outcome.status.severity(), Severity::Warning);
        assert!(outcome.status.mentions("not checked"));
        let rewritten = outcome.apply(ctx.source().source()).unwrap();
        assert!(rewritten.contains("a[i] = 1;\n    b[i] = a[i];\n  }"));
        assert!(!rewritten.contains("for (k"));
    });
}

#[test]
fn test_matmul_interchange_and_tile() {
    let source = r#"void matmul(double A[64][64], double B[64][64], double C[64][64]) {
    for (int i = 0; i < 64; i++)
        for (int j = 0; j < 64; j++)
            for (int k = 0; k < 64; k++)
                C[i][j] += A[i][k] * B[k][j];
}
"#;
    let interchange = RefactoringRequest::new(2, RefactoringKind::Interchange { depth: 2 });
    let outcome = refactor(source, &interchange, false).unwrap();
    assert!(outcome.source.unwrap().contains("    for (int k = 0; k < 64; k++)\n        for (int j"));

    let tile = RefactoringRequest::new(2, RefactoringKind::Tile { factor: 16, depth: 2 });
    let outcome = refactor(source, &tile, false).unwrap();
    let rewritten = outcome.source.unwrap();
    assert!(rewritten.contains("for (int i_0 = 0; i_0 < 64; i_0 += 16)"));
    assert!(rewritten.contains("for (int k = k_0; k < k_0 + 16 && k < 64; k++)"));
}

#[test]
fn test_kernels_loop_downgrades_carried_dependence() {
    let source = "void f(int a[10]) {\n  for (i = 1; i < 10; i++)\n    a[i] = a[i - 1] + 1;\n}\n";
    let parallel = RefactoringRequest::new(2, RefactoringKind::Parallelize(ParallelKind::Parallel));
    let outcome = refactor(source, &parallel, false).unwrap();
    assert_eq!(outcome.status.severity(), Severity::Error);
    assert!(outcome.source.is_none());

    let kernels = RefactoringRequest::new(2, RefactoringKind::Parallelize(ParallelKind::Kernels));
    let outcome = refactor(source, &kernels, false).unwrap();
    assert_eq!(outcome.status.severity(), Severity::Warning);
    assert!(outcome.source.unwrap().contains("  #pragma acc kernels loop\n  for (i = 1"));
}

#[test]
fn test_analysis_failures_become_fatal_status() {
    let source = "void f(int a[10], int b[10]) {\n  for (i = 0; i < 10; i++)\n    a[b[i]] = 0;\n}\n";
    let request = RefactoringRequest::new(2, RefactoringKind::Parallelize(ParallelKind::Parallel));
    let outcome = refactor(source, &request, false).unwrap();
    assert!(outcome.status.has_fatal_error());
    assert!(outcome.status.mentions("Dependences could not be analyzed"));
}

#[test]
fn test_cancelled_request() {
    let source = "void f(int a[10]) {\n  for (i = 0; i < 10; i++)\n    a[i] = 0;\n}\n";
    let unit = parse(source).unwrap();
    let token = CancellationToken::new();
    let ctx = RefactoringContext::new(&unit).with_cancellation(token.clone());
    token.cancel();
    let target = ctx.loop_at_line(2).unwrap();
    assert!(perform(&Unrolling::new(target, 2), &ctx).is_err());
    assert!(check(&Parallelize::parallel(target), &ctx).has_fatal_error());
}
