use std::{fmt, str::FromStr};

use tracing::debug;

use crate::{
    ast::Stage,
    batch::{self, BatchResult},
    error::{CompileError, EvalError},
    evaluator::Evaluator,
    functions::FunctionRegistry,
    lexer::Lexer,
    parameters::Parameters,
    parser::Parser,
    value::Value,
};

/// A compiled expression.
///
/// Compilation happens once; the resulting tree is never modified, so the
/// same `Expression` can be evaluated any number of times, from any number
/// of threads, without locking.
///
/// # Examples
///
/// ```
/// use valuate::{Expression, MapParameters, Value};
///
/// let expr = Expression::new("(requests_made * requests_succeeded / 100) >= 90").unwrap();
///
/// let params = MapParameters::new()
///     .with("requests_made", 100)
///     .with("requests_succeeded", 95);
///
/// assert_eq!(expr.evaluate(&params).unwrap(), Value::Boolean(true));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Stage,
}

impl Expression {
    /// Compiles `source` against the standard function registry.
    pub fn new(source: &str) -> Result<Self, CompileError> {
        Self::with_functions(source, FunctionRegistry::shared_standard())
    }

    /// Compiles `source`, resolving calls against `functions`.
    ///
    /// The registry is only consulted here; the compiled expression keeps
    /// its own handles to the functions it calls.
    pub fn with_functions(source: &str, functions: &FunctionRegistry) -> Result<Self, CompileError> {
        let root = Parser::with_functions(Lexer::new(source), functions)?.parse()?;
        debug!(source, nodes = root.node_count(), "compiled expression");
        Ok(Expression {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Distinct parameter names the expression reads, in first-use order.
    pub fn parameter_names(&self) -> Vec<&str> {
        self.root.parameter_names()
    }

    pub fn evaluate(&self, parameters: &dyn Parameters) -> Result<Value, EvalError> {
        Evaluator::new(parameters).eval(&self.root)
    }

    /// Evaluates each set in order. Errors are recorded per set.
    pub fn evaluate_batch<P: Parameters>(&self, sets: &[P]) -> Vec<BatchResult> {
        batch::run_sequential(&self.root, sets)
    }

    /// Same output as [`evaluate_batch`](Self::evaluate_batch), computed on
    /// a pool of `workers` threads (`0` for the default).
    ///
    /// # Examples
    ///
    /// ```
    /// use valuate::{EvalError, Expression, MapParameters, Value};
    ///
    /// let expr = Expression::new("foo > threshold").unwrap();
    /// let sets = vec![
    ///     MapParameters::new().with("foo", 5).with("threshold", 1),
    ///     MapParameters::new().with("foo", 5),
    /// ];
    ///
    /// let results = expr.evaluate_batch_parallel(&sets, 2);
    /// assert_eq!(results[0], Ok(Value::Boolean(true)));
    /// assert_eq!(results[1], Err(EvalError::ParameterNotFound("threshold".into())));
    /// ```
    pub fn evaluate_batch_parallel<P: Parameters + Sync>(
        &self,
        sets: &[P],
        workers: usize,
    ) -> Vec<BatchResult> {
        batch::run_parallel(&self.root, sets, workers)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for Expression {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Expression::new(s)
    }
}

const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Expression>();
};
