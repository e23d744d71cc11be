//! Variable access blocks.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::block::{Block, Evaluate};
use crate::error::ScriptError;
use crate::runtime::Runtime;
use crate::value::Value;

/// Name held in the `VAR` field.
///
/// The editor writes either the plain name or a variable reference object
/// carrying a `name` (older documents only carry an `id`).
fn variable_name(block: &Block) -> Result<&str, ScriptError> {
    match block.field("VAR")? {
        JsonValue::String(name) => Ok(name),
        JsonValue::Object(reference) => reference
            .get("name")
            .or_else(|| reference.get("id"))
            .and_then(JsonValue::as_str)
            .ok_or_else(|| block.invalid_field("VAR", "variable reference has no name")),
        _ => Err(block.invalid_field("VAR", "expected a variable name")),
    }
}

/// `variables_get`.
#[derive(Debug, Default)]
pub struct VariablesGet;

#[async_trait]
impl Evaluate for VariablesGet {
    async fn evaluate(&self, block: &Block, runtime: &mut Runtime) -> Result<Value, ScriptError> {
        let name = variable_name(block)?;
        Ok(runtime.context().get(name))
    }
}

/// `variables_set`: assigns `VALUE` with local/root resolution.
#[derive(Debug, Default)]
pub struct VariablesSet;

#[async_trait]
impl Evaluate for VariablesSet {
    async fn evaluate(&self, block: &Block, runtime: &mut Runtime) -> Result<Value, ScriptError> {
        let name = variable_name(block)?;
        let value = runtime.value(block, "VALUE").await?;
        runtime.context_mut().set(name, value);
        Ok(Value::Null)
    }
}

/// `variables_set_global`: assigns `VALUE` in the root scope.
#[derive(Debug, Default)]
pub struct VariablesSetGlobal;

#[async_trait]
impl Evaluate for VariablesSetGlobal {
    async fn evaluate(&self, block: &Block, runtime: &mut Runtime) -> Result<Value, ScriptError> {
        let name = variable_name(block)?;
        let value = runtime.value(block, "VALUE").await?;
        runtime.context_mut().set_global(name, value);
        Ok(Value::Null)
    }
}
