//! blockflow: execution engine for visually-authored block scripts.
//!
//! Scripts arrive as JSON block trees written by a visual editor. Each tree
//! is parsed once against a [`BlockRegistry`] and can then be run any number
//! of times against a [`ScriptSite`] that supplies preset inputs and
//! environment services.
//!
//! # Features
//!
//! - **Open block set**: block kinds are registered by name; the engine
//!   only knows the [`Evaluate`] capability
//! - **Async/await**: evaluation is a chain of futures; a paused debugger
//!   holds no thread
//! - **Two-tier scoping**: reads consult the current scope and the root
//!   scope only
//! - **Debugger hooks**: `Enter`, `Leave` and `Finish` stop points with a
//!   channel-driven [`Stepper`]
//! - **Replayable logs**: every run yields a [`ScriptLoggingResult`];
//!   attached log modifiers can be replayed from storage
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use blockflow::{BlockRegistry, StaticSite, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = BlockRegistry::standard();
//!     let script = registry.builder().name("greeting").parse(r#"{
//!         "type": "text_join",
//!         "extraState": { "itemCount": 2 },
//!         "inputs": {
//!             "ADD0": { "block": { "type": "text", "fields": { "TEXT": "Hello, " } } },
//!             "ADD1": { "block": { "type": "variables_get", "fields": { "VAR": "name" } } }
//!         }
//!     }"#)?;
//!
//!     let site = StaticSite::new().with_preset("name", Value::from("world"));
//!     let run = script.run(Arc::new(site)).await;
//!     println!("{} -> {:?}", run.outcome(), run.value);
//!     Ok(())
//! }
//! ```
//!
//! # Custom Blocks
//!
//! ```rust
//! use async_trait::async_trait;
//! use blockflow::{Block, BlockRegistry, Evaluate, Runtime, ScriptError, Value};
//!
//! #[derive(Default)]
//! struct Shout;
//!
//! #[async_trait]
//! impl Evaluate for Shout {
//!     async fn evaluate(&self, block: &Block, runtime: &mut Runtime) -> Result<Value, ScriptError> {
//!         let text = runtime.value(block, "TEXT").await?;
//!         Ok(Value::from(text.as_string().to_uppercase()))
//!     }
//! }
//!
//! let mut registry = BlockRegistry::standard();
//! registry.register_kind::<Shout>("text_shout");
//! assert!(registry.contains("text_shout"));
//! ```

#![warn(missing_docs)]

mod block;
pub mod blocks;
mod context;
mod debugger;
mod error;
mod interpreter;
mod logging;
mod modifier;
mod parser;
mod registry;
mod runtime;
mod script;
mod site;
mod value;

// Public API exports
pub use block::{Block, Evaluate, Mutation, DEFAULT_MUTATION_DOMAIN};
pub use context::{Context, ScopeId};
pub use debugger::{DebugEvent, Debugger, StepCommand, StopEvent, StopReason, Stepper, StepperHandle};
pub use error::{ModifierError, ParseError, ScriptError};
pub use logging::{Annotate, ChildScripts, ModifierRecord, ScriptLoggingResult, ScriptOutcome};
pub use modifier::{
    attach as attach_modifier, ChildScriptModifier, ModifierCatalog, ScriptLogModifier, Supports, TagModifier,
};
pub use parser::MAX_NESTING_DEPTH;
pub use registry::{BlockFactory, BlockRegistry};
pub use runtime::Runtime;
pub use script::{AbortHandle, EngineConfig, ParsedScript, ScriptBuilder, ScriptRun};
pub use site::{attribution, ChildScript, CurrentUser, NamedUser, ScriptSite, StaticSite, ANONYMOUS};
pub use value::Value;
