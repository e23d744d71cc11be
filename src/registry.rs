//! Block-kind registry and editor catalogs.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::block::Evaluate;
use crate::error::ParseError;
use crate::script::{ParsedScript, ScriptBuilder};

/// Constructor for one block kind.
pub type BlockFactory = Arc<dyn Fn() -> Arc<dyn Evaluate> + Send + Sync>;

/// Maps block kind identifiers to their implementations.
///
/// The registry also carries the block definitions, data-model definitions
/// and toolbox entries handed to the editor. Those are stored and returned
/// as given; the engine never reads them.
///
/// # Example
///
/// ```rust
/// use blockflow::BlockRegistry;
///
/// let registry = BlockRegistry::standard();
/// let script = registry.parse(r#"{ "type": "math_number", "fields": { "NUM": 4 } }"#)?;
/// # Ok::<(), blockflow::ParseError>(())
/// ```
#[derive(Clone, Default)]
pub struct BlockRegistry {
    kinds: HashMap<String, BlockFactory>,
    block_definitions: Vec<JsonValue>,
    model_definitions: Vec<JsonValue>,
    toolbox: Vec<(String, JsonValue)>,
}

impl fmt::Debug for BlockRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.kinds.keys().collect();
        kinds.sort();
        f.debug_struct("BlockRegistry")
            .field("kinds", &kinds)
            .field("block_definitions", &self.block_definitions.len())
            .field("model_definitions", &self.model_definitions.len())
            .field("toolbox", &self.toolbox.len())
            .finish()
    }
}

impl BlockRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the standard block catalog.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        crate::blocks::register_standard(&mut registry);
        registry
    }

    /// Bind `kind` to `factory`, replacing any previous binding.
    pub fn register<F, E>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn() -> E + Send + Sync + 'static,
        E: Evaluate + 'static,
    {
        let factory: BlockFactory = Arc::new(move || Arc::new(factory()) as Arc<dyn Evaluate>);
        self.kinds.insert(kind.into(), factory);
    }

    /// Bind `kind` to the default value of `E`.
    pub fn register_kind<E>(&mut self, kind: impl Into<String>)
    where
        E: Evaluate + Default + 'static,
    {
        self.register(kind, E::default);
    }

    /// Whether `kind` is registered.
    pub fn contains(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.kinds.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub(crate) fn instantiate(&self, kind: &str) -> Option<Arc<dyn Evaluate>> {
        self.kinds.get(kind).map(|factory| factory())
    }

    /// Add an editor block definition.
    pub fn add_block_definition(&mut self, definition: JsonValue) -> &mut Self {
        self.block_definitions.push(definition);
        self
    }

    /// Add an editor data-model definition.
    pub fn add_model_definition(&mut self, definition: JsonValue) -> &mut Self {
        self.model_definitions.push(definition);
        self
    }

    /// Add a named toolbox entry.
    pub fn add_toolbox_entry(&mut self, name: impl Into<String>, entry: JsonValue) -> &mut Self {
        self.toolbox.push((name.into(), entry));
        self
    }

    /// Block definitions, as added.
    pub fn block_definitions(&self) -> &[JsonValue] {
        &self.block_definitions
    }

    /// Data-model definitions, as added.
    pub fn model_definitions(&self) -> &[JsonValue] {
        &self.model_definitions
    }

    /// Toolbox entries, as added.
    pub fn toolbox(&self) -> &[(String, JsonValue)] {
        &self.toolbox
    }

    /// Builder for parsing scripts with non-default settings.
    pub fn builder(&self) -> ScriptBuilder<'_> {
        ScriptBuilder::new(self)
    }

    /// Parse `input` with default settings.
    pub fn parse(&self, input: &str) -> Result<ParsedScript, ParseError> {
        self.builder().parse(input)
    }
}
