//! Block evaluation protocol.

use std::future::Future;
use std::pin::Pin;

use crate::block::Block;
use crate::debugger::StopReason;
use crate::error::ScriptError;
use crate::runtime::Runtime;
use crate::value::Value;

/// Boxed future returned by the recursive evaluation entry point.
pub type EvalFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, ScriptError>> + Send + 'a>>;

/// Evaluate a statement chain starting at `block`.
///
/// Each block is entered, evaluated and left before its `next` is touched.
/// The chain's result is the result of its last block.
pub fn evaluate_chain<'a>(block: &'a Block, runtime: &'a mut Runtime) -> EvalFuture<'a> {
    Box::pin(async move {
        let mut current = Some(block);
        let mut result = Value::Null;
        while let Some(block) = current {
            result = evaluate_block(block, runtime).await?;
            current = block.next();
        }
        Ok(result)
    })
}

/// Evaluate a single block, ignoring its `next`.
async fn evaluate_block(block: &Block, runtime: &mut Runtime) -> Result<Value, ScriptError> {
    runtime.check_abort()?;
    runtime.intercept(block, StopReason::Enter).await?;
    let result = block.behavior().evaluate(block, runtime).await?;
    runtime.intercept(block, StopReason::Leave).await?;
    Ok(result)
}
