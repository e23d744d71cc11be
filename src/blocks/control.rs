//! Control-flow blocks.

use async_trait::async_trait;

use crate::block::{Block, Evaluate};
use crate::error::ScriptError;
use crate::runtime::Runtime;
use crate::value::Value;

/// `controls_if`: `IF0/DO0 .. IFn/DOn` plus an optional `ELSE`.
///
/// The number of else-if branches comes from the `elseIfCount` mutation
/// and the else branch is only considered when `hasElse` is set. The
/// result is that of the branch taken, or null.
#[derive(Debug, Default)]
pub struct ControlsIf;

#[async_trait]
impl Evaluate for ControlsIf {
    async fn evaluate(&self, block: &Block, runtime: &mut Runtime) -> Result<Value, ScriptError> {
        let branches = block.mutation_count("elseIfCount") + 1;
        for index in 0..branches {
            let condition = runtime
                .optional_value(block, &format!("IF{}", index))
                .await?
                .unwrap_or(Value::Bool(false));
            if condition.as_bool() {
                return runtime.statements(block, &format!("DO{}", index)).await;
            }
        }
        if block.mutation_flag("hasElse") {
            return runtime.statements(block, "ELSE").await;
        }
        Ok(Value::Null)
    }
}

/// `controls_repeat_ext` / `controls_repeat`: runs `DO` a number of times.
///
/// The count comes from the `TIMES` input, or the `TIMES` field for the
/// fixed variant. Every iteration gets its own scope.
#[derive(Debug, Default)]
pub struct ControlsRepeat;

#[async_trait]
impl Evaluate for ControlsRepeat {
    async fn evaluate(&self, block: &Block, runtime: &mut Runtime) -> Result<Value, ScriptError> {
        let times = if block.has_field("TIMES") {
            block.field_f64("TIMES")?
        } else {
            runtime.value(block, "TIMES").await?.as_number()?
        };
        let times = if times.is_finite() && times > 0.0 {
            times.floor() as u64
        } else {
            0
        };

        let mut result = Value::Null;
        for _ in 0..times {
            runtime.check_abort()?;
            result = runtime.scoped_statements(block, "DO").await?;
        }
        Ok(result)
    }
}

/// `controls_scope`: runs `DO` once in a fresh scope.
#[derive(Debug, Default)]
pub struct ControlsScope;

#[async_trait]
impl Evaluate for ControlsScope {
    async fn evaluate(&self, block: &Block, runtime: &mut Runtime) -> Result<Value, ScriptError> {
        runtime.scoped_statements(block, "DO").await
    }
}

/// `script_fail`: ends the run with the `Failure` outcome.
#[derive(Debug, Default)]
pub struct ScriptFail;

#[async_trait]
impl Evaluate for ScriptFail {
    async fn evaluate(&self, block: &Block, runtime: &mut Runtime) -> Result<Value, ScriptError> {
        let message = match runtime.optional_value(block, "MESSAGE").await? {
            Some(message) => message.as_string(),
            None => "script reported failure".to_string(),
        };
        Err(ScriptError::Failed(message))
    }
}
