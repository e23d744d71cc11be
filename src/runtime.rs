//! Runtime environment handed to every block during evaluation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::block::Block;
use crate::context::Context;
use crate::debugger::{Debugger, StopReason};
use crate::error::ScriptError;
use crate::interpreter::evaluate_chain;
use crate::logging::ScriptLoggingResult;
use crate::modifier::{self, ChildScriptModifier, ScriptLogModifier, Supports};
use crate::site::ScriptSite;
use crate::value::Value;

/// State of one script run: scopes, collaborators and the live log record.
pub struct Runtime {
    /// Variable scopes.
    context: Context,
    /// Optional per-block instrumentation.
    debugger: Option<Arc<dyn Debugger>>,
    /// Presets and environment services.
    site: Arc<dyn ScriptSite>,
    /// Raised when the run must stop.
    abort: watch::Receiver<bool>,
    /// Log record of this run.
    log: ScriptLoggingResult,
    /// Whether every spawned sub-execution ended in a terminal outcome.
    children_settled: bool,
}

impl Runtime {
    pub(crate) fn new(
        context: Context,
        debugger: Option<Arc<dyn Debugger>>,
        site: Arc<dyn ScriptSite>,
        abort: watch::Receiver<bool>,
        log: ScriptLoggingResult,
    ) -> Self {
        Self {
            context,
            debugger,
            site,
            abort,
            log,
            children_settled: true,
        }
    }

    /// Get a reference to the context.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Get a mutable reference to the context.
    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    /// The site this run is evaluated against.
    pub fn site(&self) -> Arc<dyn ScriptSite> {
        Arc::clone(&self.site)
    }

    /// The live log record.
    pub fn log(&self) -> &ScriptLoggingResult {
        &self.log
    }

    /// Fails with [`ScriptError::Aborted`] once an abort was requested.
    pub fn check_abort(&self) -> Result<(), ScriptError> {
        if *self.abort.borrow() {
            Err(ScriptError::Aborted)
        } else {
            Ok(())
        }
    }

    /// Evaluate the child connected to `slot`; a missing slot is an error.
    pub async fn value(&mut self, block: &Block, slot: &str) -> Result<Value, ScriptError> {
        let child = block
            .input(slot)
            .ok_or_else(|| ScriptError::MissingInput {
                kind: block.kind().to_string(),
                block: block.label().to_string(),
                slot: slot.to_string(),
            })?;
        self.check_abort()?;
        evaluate_chain(child, self).await
    }

    /// Evaluate the child connected to `slot`, if any.
    pub async fn optional_value(
        &mut self,
        block: &Block,
        slot: &str,
    ) -> Result<Option<Value>, ScriptError> {
        match block.input(slot) {
            Some(child) => {
                self.check_abort()?;
                evaluate_chain(child, self).await.map(Some)
            }
            None => Ok(None),
        }
    }

    /// Run the statement body connected to `slot`; an empty body yields null.
    pub async fn statements(&mut self, block: &Block, slot: &str) -> Result<Value, ScriptError> {
        Ok(self.optional_value(block, slot).await?.unwrap_or(Value::Null))
    }

    /// Run the statement body connected to `slot` inside a fresh scope.
    ///
    /// The scope is closed again whether or not the body succeeds.
    pub async fn scoped_statements(
        &mut self,
        block: &Block,
        slot: &str,
    ) -> Result<Value, ScriptError> {
        let previous = self.context.push_scope();
        let result = self.statements(block, slot).await;
        self.context.pop_scope(previous);
        result
    }

    /// Attach a log modifier to the live record, applying it immediately.
    pub fn attach_modifier<M>(&mut self, modifier: M) -> Result<(), ScriptError>
    where
        M: ScriptLogModifier,
        ScriptLoggingResult: Supports<M::Script>,
    {
        modifier::attach(&mut self.log, modifier)?;
        Ok(())
    }

    /// Invoke a site service, giving up as soon as an abort is requested.
    pub async fn call_site(
        &mut self,
        service: &str,
        args: Vec<Value>,
    ) -> Result<Value, ScriptError> {
        self.check_abort()?;
        let site = self.site();
        self.until_aborted(site.call(service, args)).await
    }

    /// Await `operation`, failing with [`ScriptError::Aborted`] instead if
    /// the run is aborted first.
    pub async fn until_aborted<F, T>(&mut self, operation: F) -> Result<T, ScriptError>
    where
        F: Future<Output = Result<T, ScriptError>> + Send,
    {
        let abort = &mut self.abort;
        tokio::select! {
            biased;
            _ = aborted(abort) => Err(ScriptError::Aborted),
            result = operation => result,
        }
    }

    /// Start a sub-execution through the site and link it to this run.
    ///
    /// Returns the child's id.
    pub async fn spawn_child(
        &mut self,
        name: &str,
        presets: HashMap<String, Value>,
    ) -> Result<String, ScriptError> {
        self.check_abort()?;
        let site = self.site();
        let child = self.until_aborted(site.spawn_child(name, presets)).await?;
        if !child.outcome.is_terminal() {
            self.children_settled = false;
        }
        self.attach_modifier(ChildScriptModifier::new(child.id.clone()))?;
        Ok(child.id)
    }

    /// Give the debugger a chance to stop at `block`.
    ///
    /// A pending interception is abandoned as soon as an abort is requested.
    pub(crate) async fn intercept(
        &mut self,
        block: &Block,
        reason: StopReason,
    ) -> Result<(), ScriptError> {
        let Some(debugger) = self.debugger.clone() else {
            return Ok(());
        };
        debug!(kind = block.kind(), block = block.label(), %reason, "debugger interception");
        let context = &self.context;
        let abort = &mut self.abort;
        tokio::select! {
            biased;
            _ = aborted(abort) => Err(ScriptError::Aborted),
            result = debugger.intercept(block, context, reason) => result,
        }
    }

    /// The `Finish` interception; not raced against abort so it is always
    /// delivered exactly once.
    pub(crate) async fn intercept_finish(&self, root: &Block) -> Result<(), ScriptError> {
        match &self.debugger {
            Some(debugger) => {
                debugger
                    .intercept(root, &self.context, StopReason::Finish)
                    .await
            }
            None => Ok(()),
        }
    }

    pub(crate) fn notify_finished(&self, error: Option<&ScriptError>) {
        if let Some(debugger) = &self.debugger {
            debugger.script_finished(error);
        }
    }

    pub(crate) fn children_settled(&self) -> bool {
        self.children_settled
    }

    pub(crate) fn into_parts(self) -> (Context, ScriptLoggingResult) {
        (self.context, self.log)
    }
}

/// Resolves once `abort` flips to true; never resolves if the sender is gone.
async fn aborted(abort: &mut watch::Receiver<bool>) {
    let closed = abort.wait_for(|aborted| *aborted).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}
