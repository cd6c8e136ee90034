//! Callable functions and the registry they are resolved from.
//!
//! Function names are resolved while parsing, so a call to an unknown
//! function or with the wrong number of arguments never compiles. The
//! registry is read-only once an expression has been built from it.

use std::{collections::HashMap, fmt, ptr, sync::Arc};

use once_cell::sync::Lazy;

use crate::{error::FunctionError, value::Value};

type Callable = dyn Fn(&[Value]) -> Result<Value, FunctionError> + Send + Sync;

static STANDARD: Lazy<FunctionRegistry> = Lazy::new(build_standard);

/// Number of arguments a function accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Any,
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
            Arity::Any => true,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "exactly {}", n),
            Arity::AtLeast(n) => write!(f, "at least {}", n),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// A named function that can be called from an expression.
///
/// # Examples
///
/// ```
/// use valuate::{Arity, Function, Value};
///
/// let double = Function::new("double", Arity::Exact(1), |args| {
///     match args[0].as_number() {
///         Some(n) => Ok(Value::Number(n * 2.0)),
///         None => Err("double() needs a number".into()),
///     }
/// });
///
/// assert_eq!(double.call(&[Value::from(21)]).unwrap(), Value::from(42));
/// ```
#[derive(Clone)]
pub struct Function {
    name: Arc<str>,
    arity: Arity,
    body: Arc<Callable>,
}

impl Function {
    pub fn new<F>(name: impl Into<String>, arity: Arity, body: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, FunctionError> + Send + Sync + 'static,
    {
        Function {
            name: Arc::from(name.into()),
            arity,
            body: Arc::new(body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    /// Runs the body. A call with an argument count outside the arity fails
    /// here, so bodies may index the arguments they declared.
    pub fn call(&self, args: &[Value]) -> Result<Value, FunctionError> {
        if !self.arity.accepts(args.len()) {
            return Err(format!(
                "{}() takes {} arguments, got {}",
                self.name,
                self.arity,
                args.len()
            )
            .into());
        }
        (self.body)(args)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.arity == other.arity
            && ptr::eq(
                Arc::as_ptr(&self.body) as *const (),
                Arc::as_ptr(&other.body) as *const (),
            )
    }
}

/// Table of functions available to expressions at compile time.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Function>,
}

impl FunctionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the standard registry, ready to be extended.
    pub fn standard() -> Self {
        STANDARD.clone()
    }

    /// The process-wide standard registry, built on first use.
    pub fn shared_standard() -> &'static FunctionRegistry {
        &STANDARD
    }

    /// Registers `body` under `name`, replacing any previous function of that name.
    pub fn register<F>(&mut self, name: &str, arity: Arity, body: F) -> &mut Self
    where
        F: Fn(&[Value]) -> Result<Value, FunctionError> + Send + Sync + 'static,
    {
        self.insert(Function::new(name, arity, body))
    }

    pub fn insert(&mut self, function: Function) -> &mut Self {
        self.functions.insert(function.name().to_string(), function);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

fn build_standard() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    registry
        .register("len", Arity::Exact(1), fn_len)
        .register("upper", Arity::Exact(1), |args| {
            string_arg("upper", &args[0]).map(|s| Value::String(s.to_uppercase()))
        })
        .register("lower", Arity::Exact(1), |args| {
            string_arg("lower", &args[0]).map(|s| Value::String(s.to_lowercase()))
        })
        .register("trim", Arity::Exact(1), |args| {
            string_arg("trim", &args[0]).map(|s| Value::String(s.trim().to_string()))
        })
        .register("contains", Arity::Exact(2), fn_contains)
        .register("startswith", Arity::Exact(2), |args| {
            let s = string_arg("startswith", &args[0])?;
            let prefix = string_arg("startswith", &args[1])?;
            Ok(Value::Boolean(s.starts_with(prefix)))
        })
        .register("endswith", Arity::Exact(2), |args| {
            let s = string_arg("endswith", &args[0])?;
            let suffix = string_arg("endswith", &args[1])?;
            Ok(Value::Boolean(s.ends_with(suffix)))
        })
        .register("abs", Arity::Exact(1), |args| {
            number_arg("abs", &args[0]).map(|n| Value::Number(n.abs()))
        })
        .register("min", Arity::AtLeast(1), |args| fold_numbers("min", args, f64::min))
        .register("max", Arity::AtLeast(1), |args| fold_numbers("max", args, f64::max))
        .register("sum", Arity::Any, |args| {
            let numbers = flatten_numbers("sum", args)?;
            Ok(Value::Number(numbers.iter().sum()))
        });
    registry
}

fn string_arg<'a>(function: &str, value: &'a Value) -> Result<&'a str, FunctionError> {
    value.as_str().ok_or_else(|| {
        format!("{}() requires string, got {}", function, value.type_name()).into()
    })
}

fn number_arg(function: &str, value: &Value) -> Result<f64, FunctionError> {
    value.as_number().ok_or_else(|| {
        format!("{}() requires number, got {}", function, value.type_name()).into()
    })
}

/// len(x) - characters of a string or elements of an array
fn fn_len(args: &[Value]) -> Result<Value, FunctionError> {
    match &args[0] {
        Value::String(s) => Ok(Value::Number(s.chars().count() as f64)),
        Value::Array(items) => Ok(Value::Number(items.len() as f64)),
        other => Err(format!("len() requires string or array, got {}", other.type_name()).into()),
    }
}

/// contains(haystack, needle) - substring for strings, element for arrays
fn fn_contains(args: &[Value]) -> Result<Value, FunctionError> {
    match (&args[0], &args[1]) {
        (Value::String(s), Value::String(needle)) => Ok(Value::Boolean(s.contains(needle.as_str()))),
        (Value::Array(items), needle) => Ok(Value::Boolean(items.contains(needle))),
        (haystack, needle) => Err(format!(
            "contains() requires (string, string) or (array, any), got ({}, {})",
            haystack.type_name(),
            needle.type_name()
        )
        .into()),
    }
}

/// Numbers from the arguments, with array arguments spliced in.
fn flatten_numbers(function: &str, args: &[Value]) -> Result<Vec<f64>, FunctionError> {
    let mut numbers = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            Value::Array(items) => {
                for item in items {
                    numbers.push(number_arg(function, item)?);
                }
            }
            other => numbers.push(number_arg(function, other)?),
        }
    }
    Ok(numbers)
}

fn fold_numbers(function: &str, args: &[Value], pick: fn(f64, f64) -> f64) -> Result<Value, FunctionError> {
    let numbers = flatten_numbers(function, args)?;
    numbers
        .into_iter()
        .reduce(pick)
        .map(Value::Number)
        .ok_or_else(|| format!("{}() of an empty array", function).into())
}
