use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use valuate::{
    Arity, CompileError, EvalError, Expression, FnParameters, FunctionRegistry, MapParameters,
    Value,
};

fn eval(expr_str: &str, params: &MapParameters) -> Result<Value, EvalError> {
    Expression::new(expr_str)
        .unwrap_or_else(|e| panic!("compile failed for {:?}: {}", expr_str, e))
        .evaluate(params)
}

fn eval_empty(expr_str: &str) -> Result<Value, EvalError> {
    eval(expr_str, &MapParameters::new())
}

fn is_type_error(result: Result<Value, EvalError>) -> bool {
    matches!(result, Err(EvalError::TypeError(_)))
}

// ============================================================================
// Arithmetic
// ============================================================================

#[test]
fn test_precedence() {
    assert_eq!(eval_empty("2 + 3 * 4"), Ok(Value::from(14)));
    assert_eq!(eval_empty("(2 + 3) * 4"), Ok(Value::from(20)));
    assert_eq!(eval_empty("2 ** 3 ** 2"), Ok(Value::from(512)));
    assert_eq!(eval_empty("10 - 4 - 3"), Ok(Value::from(3)));
    assert_eq!(eval_empty("-2 ** 2"), Ok(Value::from(4)));
    assert_eq!(eval_empty("7 % 4 * 2"), Ok(Value::from(6)));
}

#[test]
fn test_numbers_are_uniformly_floating_point() {
    assert_eq!(eval_empty("7 / 2"), Ok(Value::from(3.5)));
    assert_eq!(eval_empty("1 == 1.0"), Ok(Value::Boolean(true)));
    assert_eq!(eval_empty("0x10 + 1"), Ok(Value::from(17)));
}

#[test]
fn test_division_by_zero_is_infinite() {
    assert_eq!(eval_empty("1 / 0"), Ok(Value::Number(f64::INFINITY)));
    match eval_empty("0 / 0") {
        Ok(Value::Number(n)) => assert!(n.is_nan()),
        other => panic!("Expected NaN, got {:?}", other),
    }
}

#[test]
fn test_string_concatenation() {
    let params = MapParameters::new().with("name", "world").with("count", 3);
    assert_eq!(eval("'hello ' + name", &params), Ok(Value::from("hello world")));
    assert_eq!(eval("'n=' + count", &params), Ok(Value::from("n=3")));
    assert_eq!(eval("count + '!'", &params), Ok(Value::from("3!")));
}

#[test]
fn test_numeric_strings_coerce_for_arithmetic() {
    let params = MapParameters::new().with("amount", "12.5");
    assert_eq!(eval("amount * 2", &params), Ok(Value::from(25)));
    assert!(is_type_error(eval("'abc' * 2", &params)));
    assert!(is_type_error(eval("true - 1", &params)));
}

// ============================================================================
// Comparison and equality
// ============================================================================

#[test]
fn test_foo_greater_than_threshold() {
    let expr = Expression::new("foo > threshold").unwrap();
    let cases = [(10, 5, true), (3, 5, false), (7, 5, true), (5, 5, false)];

    for (foo, threshold, expected) in cases {
        let params = MapParameters::new().with("foo", foo).with("threshold", threshold);
        assert_eq!(
            expr.evaluate(&params),
            Ok(Value::Boolean(expected)),
            "Failed for foo={} threshold={}",
            foo,
            threshold
        );
    }
}

#[test]
fn test_string_comparison_is_lexicographic() {
    assert_eq!(eval_empty("'apple' < 'banana'"), Ok(Value::Boolean(true)));
    assert_eq!(eval_empty("'b' >= 'abc'"), Ok(Value::Boolean(true)));
}

#[test]
fn test_mixed_comparison_is_type_error() {
    assert!(is_type_error(eval_empty("1 < 'a'")));
    assert!(is_type_error(eval_empty("true > false")));
    assert!(is_type_error(eval_empty("nil <= 1")));
}

#[test]
fn test_equality_across_kinds_never_fails() {
    assert_eq!(eval_empty("1 == '1'"), Ok(Value::Boolean(false)));
    assert_eq!(eval_empty("nil == nil"), Ok(Value::Boolean(true)));
    assert_eq!(eval_empty("(1, 'a') == (1, 'a')"), Ok(Value::Boolean(true)));
    assert_eq!(eval_empty("(1, 2) != (2, 1)"), Ok(Value::Boolean(true)));
    assert_eq!(eval_empty("true != 'true'"), Ok(Value::Boolean(true)));
}

#[test]
fn test_time_comparison() {
    let expires = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let params = MapParameters::new().with("expires", expires);

    assert_eq!(eval("expires > '2024-01-01'", &params), Ok(Value::Boolean(true)));
    assert_eq!(eval("expires < '2024-05-31 23:59:59'", &params), Ok(Value::Boolean(false)));
    assert_eq!(eval("expires == '2024-06-01T00:00:00Z'", &params), Ok(Value::Boolean(true)));
    assert!(is_type_error(eval("expires > 5", &params)));
}

// ============================================================================
// Logic and short-circuit
// ============================================================================

#[test]
fn test_logical_operators_need_booleans() {
    assert_eq!(eval_empty("true && !false"), Ok(Value::Boolean(true)));
    assert!(is_type_error(eval_empty("1 && true")));
    assert!(is_type_error(eval_empty("false || 'x'")));
    assert!(is_type_error(eval_empty("!1")));
}

#[test]
fn test_short_circuit_skips_right_side() {
    // `missing` is never looked up, so no ParameterNotFound
    let params = MapParameters::new().with("ok", true);
    assert_eq!(eval("ok || missing", &params), Ok(Value::Boolean(true)));
    assert_eq!(eval("!ok && missing", &params), Ok(Value::Boolean(false)));
    assert_eq!(eval("ok ? 1 : missing", &params), Ok(Value::from(1)));
    assert_eq!(eval("!ok ? missing : 2", &params), Ok(Value::from(2)));
    assert_eq!(eval("ok ?? missing", &params), Ok(Value::Boolean(true)));
}

#[test]
fn test_short_circuit_skips_function_calls() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let mut functions = FunctionRegistry::standard();
    functions.register("touch", Arity::Exact(0), move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Value::Boolean(true))
    });

    let expr = Expression::with_functions("false && touch()", &functions).unwrap();
    assert_eq!(expr.evaluate(&MapParameters::new()), Ok(Value::Boolean(false)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let expr = Expression::with_functions("true && touch()", &functions).unwrap();
    assert_eq!(expr.evaluate(&MapParameters::new()), Ok(Value::Boolean(true)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_ternary_requires_boolean_condition() {
    assert_eq!(eval_empty("1 < 2 ? 'yes' : 'no'"), Ok(Value::from("yes")));
    assert!(is_type_error(eval_empty("1 ? 'yes' : 'no'")));
}

#[test]
fn test_null_coalescing() {
    let params = MapParameters::new().with("empty", Value::Nil).with("zero", 0);
    assert_eq!(eval("missing ?? 42", &params), Ok(Value::from(42)));
    assert_eq!(eval("empty ?? 'fallback'", &params), Ok(Value::from("fallback")));
    assert_eq!(eval("zero ?? 42", &params), Ok(Value::from(0)));
    assert_eq!(eval("missing ?? other ?? 'last'", &params), Ok(Value::from("last")));
    assert_eq!(eval("missing.deep + 1 ?? 0", &params), Ok(Value::from(0)));
}

#[test]
fn test_null_coalescing_does_not_hide_type_errors() {
    assert!(is_type_error(eval_empty("('a' - 1) ?? 0")));
}

// ============================================================================
// Bitwise
// ============================================================================

#[test]
fn test_bitwise() {
    assert_eq!(eval_empty("6 & 3"), Ok(Value::from(2)));
    assert_eq!(eval_empty("6 | 3"), Ok(Value::from(7)));
    assert_eq!(eval_empty("6 ^ 3"), Ok(Value::from(5)));
    assert_eq!(eval_empty("1 << 10"), Ok(Value::from(1024)));
    assert_eq!(eval_empty("1024 >> 3"), Ok(Value::from(128)));
    assert_eq!(eval_empty("~5"), Ok(Value::from(-6)));
}

#[test]
fn test_bitwise_rejects_fractions() {
    assert!(is_type_error(eval_empty("1.5 & 1")));
    assert!(is_type_error(eval_empty("~0.5")));
    assert!(is_type_error(eval_empty("1 << 64")));
    assert!(is_type_error(eval_empty("'3' | 1")));
}

// ============================================================================
// Regex and membership
// ============================================================================

#[test]
fn test_regex_match() {
    let params = MapParameters::new()
        .with("path", "/api/v2/users")
        .with("pattern", "^/api/v[0-9]+/");

    assert_eq!(eval("path =~ '^/api/'", &params), Ok(Value::Boolean(true)));
    assert_eq!(eval("path !~ `users$`", &params), Ok(Value::Boolean(false)));
    assert_eq!(eval("path =~ pattern", &params), Ok(Value::Boolean(true)));
    assert_eq!(eval("'abc' =~ /^a.c$/", &params), Ok(Value::Boolean(true)));
}

#[test]
fn test_runtime_pattern_errors_are_type_errors() {
    let params = MapParameters::new().with("s", "abc").with("bad", "(");
    assert!(is_type_error(eval("s =~ bad", &params)));
    assert!(is_type_error(eval("1 =~ 'a'", &params)));
    assert!(is_type_error(eval("s =~ 1", &params)));
}

#[test]
fn test_in_membership() {
    let params = MapParameters::new()
        .with("role", "editor")
        .with("allowed", vec!["admin", "editor"]);

    assert_eq!(eval("role in allowed", &params), Ok(Value::Boolean(true)));
    assert_eq!(eval("'guest' in allowed", &params), Ok(Value::Boolean(false)));
    assert_eq!(eval("2 in (1, 2, 3)", &params), Ok(Value::Boolean(true)));
    assert_eq!(eval("role IN ('admin', 'owner')", &params), Ok(Value::Boolean(false)));
    assert!(is_type_error(eval("'e' in role", &params)));
}

// ============================================================================
// Parameters, indexing and functions
// ============================================================================

#[test]
fn test_missing_parameter() {
    let params = MapParameters::new().with("foo", 1);
    assert_eq!(
        eval("foo + bar", &params),
        Err(EvalError::ParameterNotFound("bar".into()))
    );
    assert_eq!(
        eval("foo + bar", &params).unwrap_err().to_string(),
        "no parameter 'bar' found"
    );
}

#[test]
fn test_escaped_and_dotted_names() {
    let params = MapParameters::new()
        .with("response-time", 80)
        .with("request.method", "GET");
    assert_eq!(eval("[response-time] < 100", &params), Ok(Value::Boolean(true)));
    assert_eq!(eval("request.method == 'GET'", &params), Ok(Value::Boolean(true)));
}

#[test]
fn test_indexing() {
    let params = MapParameters::new().with("items", vec![10, 20, 30]);
    assert_eq!(eval("items[0] + items[-1]", &params), Ok(Value::from(40)));
    assert_eq!(eval("items[5]", &params), Ok(Value::Nil));
    assert_eq!(eval("items[5] ?? -1", &params), Ok(Value::from(-1)));
    assert!(is_type_error(eval("items[0.5]", &params)));
    assert!(is_type_error(eval("items[0][0]", &params)));
}

#[test]
fn test_standard_functions() {
    let params = MapParameters::new()
        .with("name", "  Alice ")
        .with("scores", vec![3, 9, 4]);

    assert_eq!(eval("upper(trim(name))", &params), Ok(Value::from("ALICE")));
    assert_eq!(eval("len(scores) == 3", &params), Ok(Value::Boolean(true)));
    assert_eq!(eval("max(scores) - min(scores)", &params), Ok(Value::from(6)));
    assert_eq!(eval("sum(scores, 4)", &params), Ok(Value::from(20)));
    assert_eq!(eval("abs(-3)", &params), Ok(Value::from(3)));
    assert_eq!(eval("startswith(trim(name), 'Al')", &params), Ok(Value::Boolean(true)));
}

#[test]
fn test_function_errors_carry_name() {
    match eval_empty("len(1)") {
        Err(EvalError::Function { name, source }) => {
            assert_eq!(name, "len");
            assert!(source.to_string().contains("requires string or array"));
        }
        other => panic!("Expected function error, got {:?}", other),
    }
}

#[test]
fn test_function_arguments_propagate_lookup_errors() {
    assert_eq!(
        eval_empty("len(missing)"),
        Err(EvalError::ParameterNotFound("missing".into()))
    );
}

#[test]
fn test_closure_parameters() {
    let params = FnParameters::new(|name| match name {
        "now_hour" => Some(Value::from(14)),
        _ => None,
    });
    let expr = Expression::new("now_hour >= 9 && now_hour < 17").unwrap();
    assert_eq!(expr.evaluate(&params), Ok(Value::Boolean(true)));
}

// ============================================================================
// Compilation
// ============================================================================

#[test]
fn test_compile_errors_produce_no_expression() {
    assert!(matches!(Expression::new("1 +"), Err(CompileError::Parse(_))));
    assert!(matches!(Expression::new("'open"), Err(CompileError::Lex(_))));
    assert!(matches!(Expression::new("(1"), Err(CompileError::Parse(_))));
    assert!(matches!(Expression::new("nope(1)"), Err(CompileError::Parse(_))));
}

#[test]
fn test_recompilation_is_deterministic() {
    let source = "(a + b) * 2 > c ? 'hi' : 'lo'";
    let first = Expression::new(source).unwrap();
    let second = Expression::new(source).unwrap();
    assert_eq!(first, second);

    let params = MapParameters::new().with("a", 1).with("b", 2).with("c", 5);
    assert_eq!(first.evaluate(&params), second.evaluate(&params));
    assert_eq!(first.evaluate(&params), Ok(Value::from("hi")));
}

#[test]
fn test_expression_is_reusable_after_error() {
    let expr = Expression::new("a / b").unwrap();
    assert!(expr.evaluate(&MapParameters::new()).is_err());
    let params = MapParameters::new().with("a", 9).with("b", 3);
    assert_eq!(expr.evaluate(&params), Ok(Value::from(3)));
}

#[cfg(feature = "json")]
#[test]
fn test_json_parameters_and_result() {
    use serde_json::json;

    let params = MapParameters::from_json(json!({
        "user": { "role": "admin", "id": 7 },
        "tags": ["a", "b"]
    }))
    .unwrap();

    let expr = Expression::new("user.role == 'admin' ? tags : nil").unwrap();
    let result = expr.evaluate(&params).unwrap();
    assert_eq!(result.to_json(), json!(["a", "b"]));
}
