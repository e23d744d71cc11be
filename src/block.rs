//! Parsed block nodes and the evaluation capability every kind implements.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::ScriptError;
use crate::runtime::Runtime;
use crate::value::Value;

/// Domain used when a mutation does not name one.
pub const DEFAULT_MUTATION_DOMAIN: &str = "config";

/// Behaviour of one block kind.
///
/// Implementations only compute their own result. Debugger interception,
/// abort checks and `next` chaining are handled by the interpreter around
/// every call.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use blockflow::{Block, Evaluate, Runtime, ScriptError, Value};
///
/// #[derive(Default)]
/// struct Double;
///
/// #[async_trait]
/// impl Evaluate for Double {
///     async fn evaluate(&self, block: &Block, runtime: &mut Runtime) -> Result<Value, ScriptError> {
///         let n = runtime.value(block, "NUM").await?.as_number()?;
///         Ok(Value::Number(n * 2.0))
///     }
/// }
/// ```
#[async_trait]
pub trait Evaluate: Send + Sync {
    /// Produce this block's own result.
    async fn evaluate(&self, block: &Block, runtime: &mut Runtime) -> Result<Value, ScriptError>;
}

/// Kind-specific configuration attached to a block.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    /// Namespace of the entry.
    pub domain: String,
    /// Entry name.
    pub name: String,
    /// Raw value.
    pub value: JsonValue,
}

impl Mutation {
    /// Create a mutation in the default domain.
    pub fn new(name: impl Into<String>, value: JsonValue) -> Self {
        Self {
            domain: DEFAULT_MUTATION_DOMAIN.to_string(),
            name: name.into(),
            value,
        }
    }
}

/// One node of a parsed script.
pub struct Block {
    pub(crate) kind: String,
    pub(crate) id: Option<String>,
    pub(crate) fields: HashMap<String, JsonValue>,
    pub(crate) values: HashMap<String, Block>,
    pub(crate) mutations: Vec<Mutation>,
    pub(crate) next: Option<Box<Block>>,
    pub(crate) behavior: Arc<dyn Evaluate>,
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .field("fields", &self.fields)
            .field("values", &self.values)
            .field("mutations", &self.mutations)
            .field("next", &self.next)
            .finish_non_exhaustive()
    }
}

impl Block {
    /// Registered kind of this block.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Editor-assigned id, if the node carried one.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Id for messages, `"?"` when the node has none.
    pub fn label(&self) -> &str {
        self.id.as_deref().unwrap_or("?")
    }

    pub(crate) fn behavior(&self) -> &dyn Evaluate {
        self.behavior.as_ref()
    }

    /// Following statement in the sequence.
    pub fn next(&self) -> Option<&Block> {
        self.next.as_deref()
    }

    /// Child block connected to `slot`.
    pub fn input(&self, slot: &str) -> Option<&Block> {
        self.values.get(slot)
    }

    /// Whether a child block is connected to `slot`.
    pub fn has_input(&self, slot: &str) -> bool {
        self.values.contains_key(slot)
    }

    /// Names of every connected input.
    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Whether the field `name` was supplied.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Raw literal of a required field.
    pub fn field(&self, name: &str) -> Result<&JsonValue, ScriptError> {
        self.fields
            .get(name)
            .ok_or_else(|| ScriptError::MissingField {
                kind: self.kind.clone(),
                block: self.label().to_string(),
                field: name.to_string(),
            })
    }

    /// Required field holding a string.
    pub fn field_str(&self, name: &str) -> Result<&str, ScriptError> {
        self.field(name)?
            .as_str()
            .ok_or_else(|| self.invalid_field(name, "expected a string"))
    }

    /// Required field holding a number, or a string that parses as one.
    pub fn field_f64(&self, name: &str) -> Result<f64, ScriptError> {
        match self.field(name)? {
            JsonValue::Number(n) => n
                .as_f64()
                .ok_or_else(|| self.invalid_field(name, "number out of range")),
            JsonValue::String(s) => s
                .trim()
                .parse()
                .map_err(|_| self.invalid_field(name, "expected a number")),
            _ => Err(self.invalid_field(name, "expected a number")),
        }
    }

    pub(crate) fn invalid_field(&self, name: &str, message: &str) -> ScriptError {
        ScriptError::InvalidField {
            kind: self.kind.clone(),
            field: name.to_string(),
            message: message.to_string(),
        }
    }

    /// Look up a mutation; `None` for the domain means [`DEFAULT_MUTATION_DOMAIN`].
    pub fn mutation(&self, domain: Option<&str>, name: &str) -> Option<&JsonValue> {
        let domain = domain.unwrap_or(DEFAULT_MUTATION_DOMAIN);
        self.mutations
            .iter()
            .find(|m| m.domain == domain && m.name == name)
            .map(|m| &m.value)
    }

    /// Non-negative count stored in a default-domain mutation, `0` if absent.
    pub fn mutation_count(&self, name: &str) -> usize {
        match self.mutation(None, name) {
            Some(JsonValue::Number(n)) => n.as_u64().unwrap_or(0) as usize,
            Some(JsonValue::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        }
    }

    /// Boolean flag stored in a default-domain mutation, `false` if absent.
    pub fn mutation_flag(&self, name: &str) -> bool {
        match self.mutation(None, name) {
            Some(JsonValue::Bool(b)) => *b,
            Some(JsonValue::String(s)) => s == "true" || s == "1",
            Some(JsonValue::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
            _ => false,
        }
    }

    /// All mutations in declaration order.
    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    /// Number of blocks in the statement chain starting here.
    pub fn chain_len(&self) -> usize {
        std::iter::successors(Some(self), |b| b.next()).count()
    }
}
