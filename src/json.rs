//! JSON conversions for parameters and results.
//!
//! Parameter documents must be objects. Nested objects are flattened into
//! dotted names, so `{"request": {"method": "GET"}}` binds `request.method`,
//! which is exactly how a dotted identifier in an expression is looked up.
//!
//! ```
//! use serde_json::json;
//! use valuate::{Expression, MapParameters, Value};
//!
//! let params = MapParameters::from_json(json!({
//!     "request": { "method": "GET", "retries": 2 }
//! }))
//! .unwrap();
//!
//! let expr = Expression::new("request.method == 'GET' && request.retries < 3").unwrap();
//! assert_eq!(expr.evaluate(&params).unwrap(), Value::Boolean(true));
//! ```

use chrono::SecondsFormat;
use serde_json::{Map, Number};
use thiserror::Error;

use crate::{parameters::MapParameters, value::Value};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum JsonError {
    #[error("invalid JSON: {0}")]
    Syntax(String),

    #[error("parameters must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("objects inside arrays are not supported (at '{0}')")]
    ObjectInArray(String),

    #[error("number at '{0}' cannot be represented")]
    UnrepresentableNumber(String),
}

impl From<serde_json::Error> for JsonError {
    fn from(e: serde_json::Error) -> Self {
        JsonError::Syntax(e.to_string())
    }
}

fn json_type_name(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

impl MapParameters {
    /// Parameters from a JSON object; nested objects become dotted names.
    pub fn from_json(json: serde_json::Value) -> Result<Self, JsonError> {
        let object = match json {
            serde_json::Value::Object(object) => object,
            other => return Err(JsonError::NotAnObject(json_type_name(&other))),
        };
        let mut params = MapParameters::new();
        flatten_into(&mut params, "", object)?;
        Ok(params)
    }

    pub fn from_json_str(text: &str) -> Result<Self, JsonError> {
        Self::from_json(serde_json::from_str(text)?)
    }
}

fn flatten_into(
    params: &mut MapParameters,
    prefix: &str,
    object: Map<String, serde_json::Value>,
) -> Result<(), JsonError> {
    for (key, value) in object {
        let name = if prefix.is_empty() {
            key
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            serde_json::Value::Object(nested) => flatten_into(params, &name, nested)?,
            other => {
                let value = json_to_value(&name, other)?;
                params.insert(name, value);
            }
        }
    }
    Ok(())
}

fn json_to_value(path: &str, v: serde_json::Value) -> Result<Value, JsonError> {
    match v {
        serde_json::Value::Null => Ok(Value::Nil),
        serde_json::Value::Bool(b) => Ok(Value::Boolean(b)),
        serde_json::Value::Number(n) => n
            .as_f64()
            .map(Value::Number)
            .ok_or_else(|| JsonError::UnrepresentableNumber(path.to_string())),
        serde_json::Value::String(s) => Ok(Value::String(s)),
        serde_json::Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| json_to_value(&format!("{}[{}]", path, i), item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        serde_json::Value::Object(_) => Err(JsonError::ObjectInArray(path.to_string())),
    }
}

impl Value {
    /// JSON rendering of an evaluation result.
    ///
    /// Times become RFC 3339 strings and patterns their source text.
    /// Nil and non-finite numbers become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Nil => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Time(t) => {
                serde_json::Value::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Value::Pattern(re) => serde_json::Value::String(re.as_str().to_string()),
        }
    }
}

// Integral values print without a trailing ".0".
fn number_to_json(n: f64) -> serde_json::Value {
    if let Some(i) = crate::value::integral(n) {
        return serde_json::Value::Number(i.into());
    }
    Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        value.to_json()
    }
}
