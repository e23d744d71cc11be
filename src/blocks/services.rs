//! Blocks reaching outside the script: site services, sub-scripts and the log.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::block::{Block, Evaluate};
use crate::error::ScriptError;
use crate::modifier::TagModifier;
use crate::runtime::Runtime;
use crate::value::Value;

/// `site_call`: invokes service `SERVICE` with `ARG0..ARGn`.
///
/// `n` comes from the `argCount` mutation. The block finishes once the
/// service has answered or the run is aborted.
#[derive(Debug, Default)]
pub struct SiteCall;

#[async_trait]
impl Evaluate for SiteCall {
    async fn evaluate(&self, block: &Block, runtime: &mut Runtime) -> Result<Value, ScriptError> {
        let service = block.field_str("SERVICE")?;
        let count = block.mutation_count("argCount");
        let mut args = Vec::with_capacity(count);
        for index in 0..count {
            args.push(runtime.value(block, &format!("ARG{}", index)).await?);
        }
        runtime.call_site(service, args).await
    }
}

/// `script_child`: starts script `SCRIPT` as a sub-execution, returning its id.
///
/// An optional `INPUT` value is passed to the child as preset `input`.
#[derive(Debug, Default)]
pub struct ScriptChild;

#[async_trait]
impl Evaluate for ScriptChild {
    async fn evaluate(&self, block: &Block, runtime: &mut Runtime) -> Result<Value, ScriptError> {
        let name = block.field_str("SCRIPT")?;
        let mut presets = HashMap::new();
        if let Some(input) = runtime.optional_value(block, "INPUT").await? {
            presets.insert("input".to_string(), input);
        }
        let id = runtime.spawn_child(name, presets).await?;
        Ok(Value::String(id))
    }
}

/// `log_tag`: annotates the run's log with `KEY` = `VALUE`.
#[derive(Debug, Default)]
pub struct LogTag;

#[async_trait]
impl Evaluate for LogTag {
    async fn evaluate(&self, block: &Block, runtime: &mut Runtime) -> Result<Value, ScriptError> {
        let key = block.field_str("KEY")?;
        let value = runtime.value(block, "VALUE").await?;
        runtime.attach_modifier(TagModifier::new(key, JsonValue::from(&value)))?;
        Ok(value)
    }
}
