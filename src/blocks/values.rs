//! Literal, arithmetic, comparison and text blocks.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::block::{Block, Evaluate};
use crate::error::ScriptError;
use crate::runtime::Runtime;
use crate::value::Value;

/// `math_number`: the number in field `NUM`.
#[derive(Debug, Default)]
pub struct MathNumber;

#[async_trait]
impl Evaluate for MathNumber {
    async fn evaluate(&self, block: &Block, _runtime: &mut Runtime) -> Result<Value, ScriptError> {
        Ok(Value::Number(block.field_f64("NUM")?))
    }
}

/// `text`: the string in field `TEXT`.
#[derive(Debug, Default)]
pub struct Text;

#[async_trait]
impl Evaluate for Text {
    async fn evaluate(&self, block: &Block, _runtime: &mut Runtime) -> Result<Value, ScriptError> {
        Ok(Value::from(block.field_str("TEXT")?))
    }
}

/// `logic_boolean`: field `BOOL`, `"TRUE"` or `"FALSE"`.
#[derive(Debug, Default)]
pub struct LogicBoolean;

#[async_trait]
impl Evaluate for LogicBoolean {
    async fn evaluate(&self, block: &Block, _runtime: &mut Runtime) -> Result<Value, ScriptError> {
        match block.field("BOOL")? {
            JsonValue::Bool(b) => Ok(Value::Bool(*b)),
            JsonValue::String(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            JsonValue::String(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            _ => Err(block.invalid_field("BOOL", "expected TRUE or FALSE")),
        }
    }
}

/// `logic_null`.
#[derive(Debug, Default)]
pub struct LogicNull;

#[async_trait]
impl Evaluate for LogicNull {
    async fn evaluate(&self, _block: &Block, _runtime: &mut Runtime) -> Result<Value, ScriptError> {
        Ok(Value::Null)
    }
}

/// `math_arithmetic`: `A <OP> B`.
#[derive(Debug, Default)]
pub struct MathArithmetic;

#[async_trait]
impl Evaluate for MathArithmetic {
    async fn evaluate(&self, block: &Block, runtime: &mut Runtime) -> Result<Value, ScriptError> {
        let op = block.field_str("OP")?;
        let a = runtime.value(block, "A").await?.as_number()?;
        let b = runtime.value(block, "B").await?.as_number()?;
        let result = match op {
            "ADD" => a + b,
            "MINUS" => a - b,
            "MULTIPLY" => a * b,
            "DIVIDE" => {
                if b == 0.0 {
                    return Err(ScriptError::Runtime("Division by zero".to_string()));
                }
                a / b
            }
            "POWER" => a.powf(b),
            _ => return Err(block.invalid_field("OP", "unknown arithmetic operator")),
        };
        Ok(Value::Number(result))
    }
}

/// `logic_compare`: `A <OP> B`.
///
/// Equality compares numbers numerically when both sides convert, and
/// display text otherwise.
#[derive(Debug, Default)]
pub struct LogicCompare;

#[async_trait]
impl Evaluate for LogicCompare {
    async fn evaluate(&self, block: &Block, runtime: &mut Runtime) -> Result<Value, ScriptError> {
        let op = block.field_str("OP")?;
        let a = runtime.value(block, "A").await?;
        let b = runtime.value(block, "B").await?;
        let equal = match (&a, &b) {
            (Value::Number(x), Value::Number(y)) => x == y,
            _ => a == b || a.as_string() == b.as_string(),
        };
        let result = match op {
            "EQ" => equal,
            "NEQ" => !equal,
            "LT" => a.as_number()? < b.as_number()?,
            "LTE" => a.as_number()? <= b.as_number()?,
            "GT" => a.as_number()? > b.as_number()?,
            "GTE" => a.as_number()? >= b.as_number()?,
            _ => return Err(block.invalid_field("OP", "unknown comparison operator")),
        };
        Ok(Value::Bool(result))
    }
}

/// `logic_operation`: short-circuiting `A AND B` / `A OR B`.
#[derive(Debug, Default)]
pub struct LogicOperation;

#[async_trait]
impl Evaluate for LogicOperation {
    async fn evaluate(&self, block: &Block, runtime: &mut Runtime) -> Result<Value, ScriptError> {
        let op = block.field_str("OP")?;
        let a = runtime.value(block, "A").await?.as_bool();
        let result = match op {
            "AND" => a && runtime.value(block, "B").await?.as_bool(),
            "OR" => a || runtime.value(block, "B").await?.as_bool(),
            _ => return Err(block.invalid_field("OP", "unknown logic operator")),
        };
        Ok(Value::Bool(result))
    }
}

/// `logic_negate`: `NOT BOOL`.
#[derive(Debug, Default)]
pub struct LogicNegate;

#[async_trait]
impl Evaluate for LogicNegate {
    async fn evaluate(&self, block: &Block, runtime: &mut Runtime) -> Result<Value, ScriptError> {
        Ok(Value::Bool(!runtime.value(block, "BOOL").await?.as_bool()))
    }
}

/// `text_join`: concatenates `ADD0..ADDn`; `n` from the `itemCount` mutation.
///
/// Unconnected items contribute nothing.
#[derive(Debug, Default)]
pub struct TextJoin;

#[async_trait]
impl Evaluate for TextJoin {
    async fn evaluate(&self, block: &Block, runtime: &mut Runtime) -> Result<Value, ScriptError> {
        let mut text = String::new();
        for index in 0..block.mutation_count("itemCount") {
            if let Some(item) = runtime.optional_value(block, &format!("ADD{}", index)).await? {
                text.push_str(&item.as_string());
            }
        }
        Ok(Value::String(text))
    }
}
