use std::collections::{BTreeMap, HashMap};

use crate::value::Value;

/// Name-keyed source of values supplied for one evaluation.
///
/// Returning `None` reports a miss; the evaluator turns it into
/// [`EvalError::ParameterNotFound`](crate::EvalError::ParameterNotFound)
/// unless the lookup sits on the left of `??`.
pub trait Parameters {
    fn get(&self, name: &str) -> Option<Value>;
}

impl<P: Parameters + ?Sized> Parameters for &P {
    fn get(&self, name: &str) -> Option<Value> {
        (**self).get(name)
    }
}

impl Parameters for HashMap<String, Value> {
    fn get(&self, name: &str) -> Option<Value> {
        HashMap::get(self, name).cloned()
    }
}

impl Parameters for BTreeMap<String, Value> {
    fn get(&self, name: &str) -> Option<Value> {
        BTreeMap::get(self, name).cloned()
    }
}

/// Parameters backed by a hash map.
///
/// # Examples
///
/// ```
/// use valuate::{MapParameters, Parameters, Value};
///
/// let params = MapParameters::new()
///     .with("foo", 10)
///     .with("name", "alice");
///
/// assert_eq!(params.get("foo"), Some(Value::from(10)));
/// assert_eq!(params.get("bar"), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapParameters {
    values: HashMap<String, Value>,
}

impl MapParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Parameters for MapParameters {
    fn get(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }
}

impl From<HashMap<String, Value>> for MapParameters {
    fn from(values: HashMap<String, Value>) -> Self {
        MapParameters { values }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for MapParameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        MapParameters {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> From<[(K, V); N]> for MapParameters {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// Parameters computed by a closure, for sources that are not maps.
///
/// # Examples
///
/// ```
/// use valuate::{FnParameters, Parameters, Value};
///
/// let env = FnParameters::new(|name| name.strip_prefix("n").and_then(|n| n.parse::<f64>().ok()).map(Value::from));
///
/// assert_eq!(env.get("n7"), Some(Value::from(7)));
/// assert_eq!(env.get("x"), None);
/// ```
pub struct FnParameters<F>(F);

impl<F> FnParameters<F>
where
    F: Fn(&str) -> Option<Value>,
{
    pub fn new(lookup: F) -> Self {
        FnParameters(lookup)
    }
}

impl<F> Parameters for FnParameters<F>
where
    F: Fn(&str) -> Option<Value>,
{
    fn get(&self, name: &str) -> Option<Value> {
        (self.0)(name)
    }
}
