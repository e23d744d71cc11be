//! Parsed scripts and their run lifecycle.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::block::Block;
use crate::context::Context;
use crate::debugger::Debugger;
use crate::error::{ParseError, ScriptError};
use crate::interpreter::evaluate_chain;
use crate::logging::{ScriptLoggingResult, ScriptOutcome};
use crate::parser;
use crate::registry::BlockRegistry;
use crate::runtime::Runtime;
use crate::site::{attribution, CurrentUser, ScriptSite};
use crate::value::Value;

/// Plain-data run settings, loadable from JSON.
///
/// ```rust
/// use blockflow::EngineConfig;
///
/// let config: EngineConfig =
///     serde_json::from_str(r#"{ "scriptName": "nightly", "timeoutMs": 5000 }"#)?;
/// assert_eq!(config.timeout_ms, Some(5000));
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Name recorded in the log.
    pub script_name: Option<String>,
    /// Id recorded in the log.
    pub script_id: Option<String>,
    /// Run time limit in milliseconds; none when absent.
    pub timeout_ms: Option<u64>,
}

/// Requests cancellation of a running script.
///
/// Cloning yields handles to the same signal.
#[derive(Clone)]
pub struct AbortHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl fmt::Debug for AbortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortHandle")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

impl Default for AbortHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortHandle {
    /// Create a handle that has not been triggered.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Ask every run watching this handle to stop.
    pub fn abort(&self) {
        self.sender.send_replace(true);
    }

    /// Whether [`AbortHandle::abort`] was called.
    pub fn is_aborted(&self) -> bool {
        *self.sender.borrow()
    }

    fn signal(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

/// Result of [`ParsedScript::run`].
#[derive(Debug)]
pub struct ScriptRun {
    /// Result of the root chain, when the run succeeded.
    pub value: Option<Value>,
    /// The finished log record.
    pub log: ScriptLoggingResult,
    /// Root-scope bindings at the end of the run.
    pub variables: HashMap<String, Value>,
    /// The error that ended the run, if any.
    pub error: Option<ScriptError>,
}

impl ScriptRun {
    /// Terminal outcome of the run.
    pub fn outcome(&self) -> ScriptOutcome {
        self.log.result()
    }
}

/// A parsed block script ready for execution.
pub struct ParsedScript {
    root: Block,
    name: Option<String>,
    id: Option<String>,
    debugger: Option<Arc<dyn Debugger>>,
    timeout: Option<Duration>,
    user: Option<Arc<dyn CurrentUser>>,
}

impl fmt::Debug for ParsedScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedScript")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("root", &self.root)
            .field("debugger", &self.debugger.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ParsedScript {
    /// Root block of the tree.
    pub fn root(&self) -> &Block {
        &self.root
    }

    /// Name recorded in the log.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Evaluate the tree as an expression.
    ///
    /// `presets` seed the root scope. No log record is kept, no debugger is
    /// consulted and the site's own presets are ignored.
    pub async fn evaluate(
        &self,
        presets: HashMap<String, Value>,
        site: Arc<dyn ScriptSite>,
    ) -> Result<Value, ScriptError> {
        let abort = AbortHandle::new();
        let log = ScriptLoggingResult::start(self.name.clone(), self.id.clone(), attribution(None));
        let mut runtime = Runtime::new(
            Context::with_variables(presets),
            None,
            site,
            abort.signal(),
            log,
        );
        self.evaluate_root(&mut runtime).await
    }

    /// Run the script with a fresh abort handle.
    pub async fn run(&self, site: Arc<dyn ScriptSite>) -> ScriptRun {
        self.run_with_abort(site, &AbortHandle::new()).await
    }

    /// Run the script, stopping early once `abort` is triggered.
    ///
    /// The returned log record is always finished with a terminal outcome.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use std::sync::Arc;
    /// # use blockflow::{AbortHandle, BlockRegistry, StaticSite};
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let registry = BlockRegistry::standard();
    /// let script = registry.parse(r#"{ "type": "logic_null" }"#)?;
    /// let abort = AbortHandle::new();
    /// let run = script.run_with_abort(Arc::new(StaticSite::new()), &abort).await;
    /// println!("{}", run.outcome());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run_with_abort(&self, site: Arc<dyn ScriptSite>, abort: &AbortHandle) -> ScriptRun {
        let user = attribution(self.user.as_deref());
        let log = ScriptLoggingResult::start(self.name.clone(), self.id.clone(), user);
        let context = Context::with_variables(site.presets());
        let mut runtime = Runtime::new(context, self.debugger.clone(), site, abort.signal(), log);

        info!(script = ?self.name, id = ?self.id, "script started");
        let mut result = self.evaluate_root(&mut runtime).await;
        let finish = runtime.intercept_finish(&self.root).await;
        // A failing Finish only matters when nothing else failed first.
        if let Err(e) = finish {
            if result.is_ok() {
                result = Err(e);
            }
        }
        runtime.notify_finished(result.as_ref().err());

        let settled = runtime.children_settled();
        let (context, mut log) = runtime.into_parts();
        if !log.children().is_empty() {
            log.set_group_complete(settled);
        }

        let (outcome, details) = match &result {
            Ok(value) => (ScriptOutcome::Success, value.as_string()),
            Err(ScriptError::Aborted) => (ScriptOutcome::Aborted, "aborted".to_string()),
            Err(e) => (e.outcome(), e.to_string()),
        };
        if let Err(e) = &result {
            warn!(script = ?self.name, error = %e, "script ended abnormally");
        }
        if let Err(e) = log.finish(outcome, details) {
            warn!(script = ?self.name, error = %e, "log record was already finished");
        }
        info!(script = ?self.name, %outcome, "script finished");

        let (value, error) = match result {
            Ok(value) => (Some(value), None),
            Err(e) => (None, Some(e)),
        };
        ScriptRun {
            value,
            log,
            variables: context.into_variables(),
            error,
        }
    }

    async fn evaluate_root(&self, runtime: &mut Runtime) -> Result<Value, ScriptError> {
        match self.timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, evaluate_chain(&self.root, runtime)).await {
                    Ok(result) => result,
                    Err(_) => {
                        // The dropped chain never closed the scopes it opened.
                        runtime.context_mut().unwind_to_root();
                        Err(ScriptError::Timeout(limit))
                    }
                }
            }
            None => evaluate_chain(&self.root, runtime).await,
        }
    }
}

/// Builder for configuring how scripts are parsed and run.
///
/// # Defaults
///
/// - No name or id
/// - No debugger
/// - No timeout
/// - Anonymous attribution
///
/// # Example
///
/// ```rust
/// use blockflow::BlockRegistry;
/// use std::time::Duration;
///
/// let registry = BlockRegistry::standard();
/// let script = registry
///     .builder()
///     .name("nightly-report")
///     .timeout(Duration::from_secs(30))
///     .parse(r#"{ "type": "text", "fields": { "TEXT": "done" } }"#)?;
/// # Ok::<(), blockflow::ParseError>(())
/// ```
pub struct ScriptBuilder<'r> {
    registry: &'r BlockRegistry,
    name: Option<String>,
    id: Option<String>,
    debugger: Option<Arc<dyn Debugger>>,
    timeout: Option<Duration>,
    user: Option<Arc<dyn CurrentUser>>,
}

impl<'r> ScriptBuilder<'r> {
    /// Create a builder resolving kinds through `registry`.
    pub fn new(registry: &'r BlockRegistry) -> Self {
        Self {
            registry,
            name: None,
            id: None,
            debugger: None,
            timeout: None,
            user: None,
        }
    }

    /// Set the script name recorded in the log.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the script id recorded in the log.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Attach a debugger to every run.
    pub fn debugger(mut self, debugger: Arc<dyn Debugger>) -> Self {
        self.debugger = Some(debugger);
        self
    }

    /// Limit how long a run may take.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the identity runs are attributed to.
    pub fn current_user(mut self, user: Arc<dyn CurrentUser>) -> Self {
        self.user = Some(user);
        self
    }

    /// Apply the values present in `config`.
    pub fn config(mut self, config: &EngineConfig) -> Self {
        if let Some(name) = &config.script_name {
            self.name = Some(name.clone());
        }
        if let Some(id) = &config.script_id {
            self.id = Some(id.clone());
        }
        if let Some(ms) = config.timeout_ms {
            self.timeout = Some(Duration::from_millis(ms));
        }
        self
    }

    /// Parse `input` with the configured options.
    pub fn parse(self, input: &str) -> Result<ParsedScript, ParseError> {
        let root = parser::parse_script(input, self.registry)?;
        Ok(ParsedScript {
            root,
            name: self.name,
            id: self.id,
            debugger: self.debugger,
            timeout: self.timeout,
            user: self.user,
        })
    }
}
