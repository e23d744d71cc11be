//! Runtime value types for block evaluation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ScriptError;

/// Largest magnitude below which every integral `f64` converts to `i64` exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// A runtime value produced by a block or stored in a scope.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Null/absent value.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Numeric value.
    Number(f64),
    /// String value.
    String(String),
    /// List of values.
    List(Vec<Value>),
}

impl Value {
    /// True for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Convert the value to a string.
    pub fn as_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < MAX_SAFE_INTEGER {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            Value::List(items) => items
                .iter()
                .map(|v| v.as_string())
                .collect::<Vec<_>>()
                .join(","),
            Value::Bool(b) => if *b { "true" } else { "false" }.to_string(),
            Value::Null => String::new(),
        }
    }

    /// Try to convert the value to a number.
    pub fn as_number(&self) -> Result<f64, ScriptError> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::String(s) => s.trim().parse::<f64>().map_err(|_| ScriptError::Type {
                expected: "number".to_string(),
                actual: format!("string '{}'", s),
            }),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Null => Ok(0.0),
            Value::List(_) => Err(ScriptError::Type {
                expected: "number".to_string(),
                actual: "list".to_string(),
            }),
        }
    }

    /// Truthiness used by conditions.
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty() && s != "0" && s != "false",
            Value::List(items) => !items.is_empty(),
            Value::Null => false,
        }
    }

    /// Get the type name of this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Number(_) => "number",
            Value::List(_) => "list",
            Value::Bool(_) => "bool",
            Value::Null => "null",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            // Objects have no runtime counterpart; keep their JSON text.
            other @ serde_json::Value::Object(_) => Value::String(other.to_string()),
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(serde_json::Value::from).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integral_numbers_print_without_fraction() {
        assert_eq!(Value::Number(3.0).as_string(), "3");
        assert_eq!(Value::Number(2.5).as_string(), "2.5");
    }

    #[test]
    fn test_large_integral_numbers_do_not_saturate() {
        assert_eq!(
            Value::Number(1e30).as_string(),
            "1000000000000000000000000000000"
        );
        assert_eq!(
            Value::Number(-1e19).as_string(),
            "-10000000000000000000"
        );
        assert_eq!(Value::Number(9_007_199_254_740_991.0).as_string(), "9007199254740991");
        assert_eq!(Value::Number(f64::INFINITY).as_string(), "inf");
    }

    #[test]
    fn test_string_to_number() {
        assert_eq!(Value::from(" 12 ").as_number().unwrap(), 12.0);
        assert!(matches!(
            Value::from("abc").as_number(),
            Err(ScriptError::Type { .. })
        ));
    }

    #[test]
    fn test_from_json_preserves_shape() {
        let json = serde_json::json!([1, "a", true, null]);
        assert_eq!(
            Value::from(json),
            Value::List(vec![
                Value::Number(1.0),
                Value::from("a"),
                Value::Bool(true),
                Value::Null,
            ])
        );
    }
}
