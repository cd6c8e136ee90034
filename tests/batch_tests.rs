use pretty_assertions::assert_eq;
use std::{sync::Arc, thread};
use valuate::{BatchResult, CompileError, EvalError, Expression, MapParameters, ParseError, Value};

fn threshold_sets() -> Vec<MapParameters> {
    vec![
        MapParameters::new().with("foo", 10).with("threshold", 5),
        MapParameters::new().with("foo", 3).with("threshold", 5),
        MapParameters::new().with("foo", 7).with("threshold", 5),
    ]
}

fn success_rate_sets(count: usize) -> Vec<MapParameters> {
    (0..count)
        .map(|i| {
            MapParameters::new()
                .with("requests_made", 100)
                .with("requests_succeeded", 80 + (i % 20) as i64)
        })
        .collect()
}

fn booleans(results: &[BatchResult]) -> Vec<bool> {
    results
        .iter()
        .map(|r| match r {
            Ok(Value::Boolean(b)) => *b,
            other => panic!("Expected boolean result, got {:?}", other),
        })
        .collect()
}

// ============================================================================
// Sequential batch
// ============================================================================

#[test]
fn test_evaluate_batch_in_order() {
    let expr = Expression::new("foo > threshold").unwrap();
    let results = expr.evaluate_batch(&threshold_sets());
    assert_eq!(booleans(&results), vec![true, false, true]);
}

#[test]
fn test_evaluate_batch_sums() {
    let expr = Expression::new("foo + bar").unwrap();
    let sets = vec![
        MapParameters::new().with("foo", 1).with("bar", 2),
        MapParameters::new().with("foo", 5).with("bar", 10),
        MapParameters::new().with("foo", 100).with("bar", 200),
    ];

    let results = expr.evaluate_batch(&sets);
    assert_eq!(
        results,
        vec![Ok(Value::from(3)), Ok(Value::from(15)), Ok(Value::from(300))]
    );
}

#[test]
fn test_batch_errors_are_isolated() {
    let expr = Expression::new("foo + bar").unwrap();
    let sets = vec![
        MapParameters::new().with("foo", 1).with("bar", 2),
        MapParameters::new().with("foo", 5),
        MapParameters::new().with("foo", 100).with("bar", 200),
    ];

    let expected = vec![
        Ok(Value::from(3)),
        Err(EvalError::ParameterNotFound("bar".into())),
        Ok(Value::from(300)),
    ];
    assert_eq!(expr.evaluate_batch(&sets), expected);
    assert_eq!(expr.evaluate_batch_parallel(&sets, 2), expected);
}

#[test]
fn test_single_evaluate_matches_single_element_batch() {
    let expr = Expression::new("foo > threshold").unwrap();
    for params in threshold_sets() {
        let batch = expr.evaluate_batch(std::slice::from_ref(&params));
        assert_eq!(batch, vec![expr.evaluate(&params)]);
    }
}

// ============================================================================
// Parallel batch
// ============================================================================

#[test]
fn test_parallel_success_rate() {
    let expr = Expression::new("(requests_made * requests_succeeded / 100) >= 90").unwrap();
    let sets = vec![
        MapParameters::new().with("requests_made", 100).with("requests_succeeded", 95),
        MapParameters::new().with("requests_made", 100).with("requests_succeeded", 85),
        MapParameters::new().with("requests_made", 100).with("requests_succeeded", 92),
        MapParameters::new().with("requests_made", 100).with("requests_succeeded", 88),
    ];

    let results = expr.evaluate_batch_parallel(&sets, 4);
    assert_eq!(booleans(&results), vec![true, false, true, false]);
}

#[test]
fn test_parallel_matches_sequential_for_all_worker_counts() {
    let expr = Expression::new("(requests_made * requests_succeeded / 100) >= 90").unwrap();
    let sets = success_rate_sets(1000);
    let sequential = expr.evaluate_batch(&sets);

    for workers in [0, 1, 2, 4, 10, 100] {
        assert_eq!(
            expr.evaluate_batch_parallel(&sets, workers),
            sequential,
            "Failed for workers={}",
            workers
        );
    }
}

#[test]
fn test_parallel_preserves_input_order() {
    let expr = Expression::new("index * 2").unwrap();
    let sets: Vec<MapParameters> = (0..500).map(|i| MapParameters::new().with("index", i)).collect();

    let results = expr.evaluate_batch_parallel(&sets, 8);
    for (i, result) in results.iter().enumerate() {
        assert_eq!(result, &Ok(Value::from(i as f64 * 2.0)), "Failed at index {}", i);
    }
}

#[test]
fn test_parallel_empty_batch() {
    let expr = Expression::new("foo > 1").unwrap();
    let sets: Vec<MapParameters> = Vec::new();
    for workers in [0, 1, 4] {
        assert!(expr.evaluate_batch_parallel(&sets, workers).is_empty());
    }
    assert!(expr.evaluate_batch(&sets).is_empty());
}

#[test]
fn test_parallel_more_workers_than_sets() {
    let expr = Expression::new("foo > threshold").unwrap();
    let results = expr.evaluate_batch_parallel(&threshold_sets(), 64);
    assert_eq!(booleans(&results), vec![true, false, true]);
}

#[test]
fn test_casbin_style_access_check() {
    let expr = Expression::new("user_role == 'admin' || resource_owner == user_id").unwrap();
    let owners = [("doc1", 100), ("doc2", 200), ("doc3", 100), ("doc4", 300), ("doc5", 100)];

    let sets: Vec<MapParameters> = owners
        .iter()
        .map(|(_, owner)| {
            MapParameters::new()
                .with("user_role", "user")
                .with("user_id", 100)
                .with("resource_owner", *owner)
        })
        .collect();

    let results = expr.evaluate_batch_parallel(&sets, 0);
    let accessible: Vec<&str> = owners
        .iter()
        .zip(booleans(&results))
        .filter(|(_, allowed)| *allowed)
        .map(|((doc, _), _)| *doc)
        .collect();

    assert_eq!(accessible, vec!["doc1", "doc3", "doc5"]);
}

#[test]
fn test_parallel_accepts_std_maps() {
    use std::collections::HashMap;

    let expr = Expression::new("x * x").unwrap();
    let sets: Vec<HashMap<String, Value>> = (1..=3)
        .map(|i| HashMap::from([("x".to_string(), Value::from(i))]))
        .collect();

    assert_eq!(
        expr.evaluate_batch_parallel(&sets, 0),
        vec![Ok(Value::from(1)), Ok(Value::from(4)), Ok(Value::from(9))]
    );
}

// ============================================================================
// Concurrent evaluation from plain threads
// ============================================================================

#[test]
fn test_concurrent_evaluation_shares_one_expression() {
    let expr = Arc::new(Expression::new("(requests_made * requests_succeeded / 100) >= 90").unwrap());

    let handles: Vec<_> = (0..32)
        .map(|id| {
            let expr = Arc::clone(&expr);
            thread::spawn(move || {
                for j in 0..100 {
                    let succeeded = 85 + (id + j) % 20;
                    let params = MapParameters::new()
                        .with("requests_made", 100)
                        .with("requests_succeeded", succeeded);
                    assert_eq!(
                        expr.evaluate(&params),
                        Ok(Value::Boolean(succeeded >= 90)),
                        "thread {} iteration {}",
                        id,
                        j
                    );
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_concurrent_failures_do_not_disturb_other_threads() {
    let expr = Arc::new(Expression::new("foo + bar").unwrap());

    thread::scope(|scope| {
        for id in 0..16 {
            let expr = &expr;
            scope.spawn(move || {
                let params = if id % 2 == 0 {
                    MapParameters::new().with("foo", id).with("bar", 1)
                } else {
                    MapParameters::new().with("foo", id)
                };
                let result = expr.evaluate(&params);
                if id % 2 == 0 {
                    assert_eq!(result, Ok(Value::from(id + 1)));
                } else {
                    assert_eq!(result, Err(EvalError::ParameterNotFound("bar".into())));
                }
            });
        }
    });
}

#[test]
fn test_cloned_expression_evaluates_independently() {
    let expr = Expression::new("foo * 2").unwrap();
    let copy = expr.clone();
    let handle = thread::spawn(move || copy.evaluate(&MapParameters::new().with("foo", 21)));
    assert_eq!(handle.join().unwrap(), Ok(Value::from(42)));
    assert_eq!(expr.evaluate(&MapParameters::new().with("foo", 1)), Ok(Value::from(2)));
}

// ============================================================================
// Expressions at the depth limit
// ============================================================================

/// Largest `n` for which `build(n)` still compiles; `n + 1` must hit the limit.
fn deepest_accepted(build: impl Fn(usize) -> String) -> usize {
    let (mut accepted, mut rejected) = (1, 2);
    while Expression::new(&build(rejected)).is_ok() {
        accepted = rejected;
        rejected *= 2;
    }
    while rejected - accepted > 1 {
        let mid = (accepted + rejected) / 2;
        if Expression::new(&build(mid)).is_ok() {
            accepted = mid;
        } else {
            rejected = mid;
        }
    }

    match Expression::new(&build(accepted + 1)) {
        Err(CompileError::Parse(ParseError::NestingTooDeep { .. })) => accepted,
        other => panic!("Expected NestingTooDeep past {}, got {:?}", accepted, other),
    }
}

fn assert_evaluates_everywhere(expr: &Expression, params: MapParameters, expected: Value) {
    assert_eq!(expr.evaluate(&params), Ok(expected.clone()));
    let sets = vec![params; 8];
    assert_eq!(expr.evaluate_batch(&sets), vec![Ok(expected.clone()); 8]);
    assert_eq!(expr.evaluate_batch_parallel(&sets, 4), vec![Ok(expected); 8]);
}

#[test]
fn test_longest_sum_chain_evaluates() {
    let build = |n: usize| vec!["x"; n].join(" + ");
    let n = deepest_accepted(build);
    assert!(n >= 900, "chain limit too low: {}", n);

    let expr = Expression::new(&build(n)).unwrap();
    assert_evaluates_everywhere(&expr, MapParameters::new().with("x", 1), Value::from(n as f64));
}

#[test]
fn test_longest_or_policy_evaluates() {
    let build = |n: usize| {
        (1..=n)
            .map(|i| format!("role == {}", i))
            .collect::<Vec<_>>()
            .join(" || ")
    };
    let n = deepest_accepted(build);

    let expr = Expression::new(&build(n)).unwrap();
    let params = MapParameters::new().with("role", n as i64);
    assert_evaluates_everywhere(&expr, params, Value::Boolean(true));
}

#[test]
fn test_longest_index_chain_evaluates() {
    let build = |n: usize| format!("x{}", "[0]".repeat(n));
    let n = deepest_accepted(build);

    let mut nested = Value::from(7);
    for _ in 0..n {
        nested = Value::Array(vec![nested]);
    }

    let expr = Expression::new(&build(n)).unwrap();
    assert_evaluates_everywhere(&expr, MapParameters::new().with("x", nested), Value::from(7));
}

#[test]
fn test_deepest_nesting_evaluates() {
    let build = |n: usize| format!("{}a{}", "a + (".repeat(n), ")".repeat(n));
    let n = deepest_accepted(build);

    let expr = Expression::new(&build(n)).unwrap();
    assert_evaluates_everywhere(&expr, MapParameters::new().with("a", 1), Value::from(n as f64 + 1.0));
}

#[test]
fn test_deepest_unary_run_evaluates() {
    let build = |n: usize| format!("{}t", "!".repeat(n));
    let n = deepest_accepted(build);

    let expr = Expression::new(&build(n)).unwrap();
    let params = MapParameters::new().with("t", true);
    assert_evaluates_everywhere(&expr, params, Value::Boolean(n % 2 == 0));
}
