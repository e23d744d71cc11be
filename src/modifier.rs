//! Log modifiers: decorators applied to a script's log record.
//!
//! A modifier names the narrowest capability it needs through
//! [`ScriptLogModifier::Script`] and can only be attached to records that
//! provide it via [`Supports`]. Every live attachment is stored on the
//! record as a [`ModifierRecord`] so a [`ModifierCatalog`] can replay the
//! same decoration later, in the same order, with `initial = false`.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::error::ModifierError;
use crate::logging::{Annotate, ChildScripts, ModifierRecord, ScriptLoggingResult};

/// A decorator for a script's log.
///
/// `apply` must produce the same externally visible decoration for
/// `initial = true` (live) and `initial = false` (replay from storage).
pub trait ScriptLogModifier: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Capability this modifier operates on.
    type Script: ?Sized;

    /// Stable name stored in [`ModifierRecord::kind`].
    const KIND: &'static str;

    /// Decorate `script`.
    fn apply(&self, script: &mut Self::Script, initial: bool) -> Result<(), ModifierError>;
}

/// Access to capability `C` of a script.
pub trait Supports<C: ?Sized> {
    /// Borrow `self` as the capability.
    fn capability(&mut self) -> &mut C;
}

impl Supports<dyn Annotate> for ScriptLoggingResult {
    fn capability(&mut self) -> &mut (dyn Annotate + 'static) {
        self
    }
}

impl Supports<dyn ChildScripts> for ScriptLoggingResult {
    fn capability(&mut self) -> &mut (dyn ChildScripts + 'static) {
        self
    }
}

impl Supports<ScriptLoggingResult> for ScriptLoggingResult {
    fn capability(&mut self) -> &mut ScriptLoggingResult {
        self
    }
}

/// Attach `modifier` to a live record: apply it with `initial = true` and
/// remember it for replay.
pub fn attach<M>(record: &mut ScriptLoggingResult, modifier: M) -> Result<(), ModifierError>
where
    M: ScriptLogModifier,
    ScriptLoggingResult: Supports<M::Script>,
{
    if record.is_finished() {
        return Err(ModifierError::AlreadyFinished);
    }
    let state = serde_json::to_value(&modifier).map_err(|e| ModifierError::InvalidState {
        kind: M::KIND.to_string(),
        message: e.to_string(),
    })?;
    modifier.apply(<ScriptLoggingResult as Supports<M::Script>>::capability(record), true)?;
    debug!(kind = M::KIND, "log modifier attached");
    record.push_modifier_record(ModifierRecord {
        kind: M::KIND.to_string(),
        state,
    });
    Ok(())
}

type Replayer<S> = Box<dyn Fn(&JsonValue, &mut S) -> Result<(), ModifierError> + Send + Sync>;

/// Replay constructors for stored modifiers, keyed by kind.
pub struct ModifierCatalog<S = ScriptLoggingResult> {
    replayers: HashMap<&'static str, Replayer<S>>,
}

impl<S> Default for ModifierCatalog<S> {
    fn default() -> Self {
        Self {
            replayers: HashMap::new(),
        }
    }
}

impl ModifierCatalog<ScriptLoggingResult> {
    /// Catalog with the modifiers shipped with this crate.
    pub fn standard() -> Self {
        let mut catalog = Self::default();
        catalog.register::<TagModifier>();
        catalog.register::<ChildScriptModifier>();
        catalog
    }

    /// Replay a stored record's own modifiers onto it.
    pub fn replay_stored(&self, record: &mut ScriptLoggingResult) -> Result<(), ModifierError> {
        let records = record.modifier_records().to_vec();
        self.replay(&records, record)
    }
}

impl<S: 'static> ModifierCatalog<S> {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make modifier kind `M` replayable against `S`.
    pub fn register<M>(&mut self)
    where
        M: ScriptLogModifier,
        S: Supports<M::Script>,
    {
        let replayer: Replayer<S> = Box::new(|state: &JsonValue, script: &mut S| {
            let modifier: M = serde_json::from_value(state.clone()).map_err(|e| {
                ModifierError::InvalidState {
                    kind: M::KIND.to_string(),
                    message: e.to_string(),
                }
            })?;
            modifier.apply(<S as Supports<M::Script>>::capability(script), false)
        });
        self.replayers.insert(M::KIND, replayer);
    }

    /// Whether `kind` can be replayed.
    pub fn contains(&self, kind: &str) -> bool {
        self.replayers.contains_key(kind)
    }

    /// Re-apply `records` to `script` in order, with `initial = false`.
    ///
    /// Stops at the first record that cannot be replayed.
    pub fn replay(&self, records: &[ModifierRecord], script: &mut S) -> Result<(), ModifierError> {
        for record in records {
            let replayer = self.replayers.get(record.kind.as_str()).ok_or_else(|| {
                warn!(kind = %record.kind, "no replay constructor for log modifier");
                ModifierError::UnknownKind(record.kind.clone())
            })?;
            replayer(&record.state, script)?;
        }
        Ok(())
    }
}

/// Writes a fixed annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagModifier {
    /// Annotation key.
    pub key: String,
    /// Annotation value.
    pub value: JsonValue,
}

impl TagModifier {
    /// Create a tag.
    pub fn new(key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl ScriptLogModifier for TagModifier {
    type Script = dyn Annotate;
    const KIND: &'static str = "tag";

    fn apply(&self, script: &mut Self::Script, _initial: bool) -> Result<(), ModifierError> {
        script.annotate(&self.key, self.value.clone());
        Ok(())
    }
}

/// Links a sub-execution to the script that spawned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildScriptModifier {
    /// Id of the sub-execution.
    pub child_id: String,
}

impl ChildScriptModifier {
    /// Link `child_id`.
    pub fn new(child_id: impl Into<String>) -> Self {
        Self {
            child_id: child_id.into(),
        }
    }
}

impl ScriptLogModifier for ChildScriptModifier {
    type Script = dyn ChildScripts;
    const KIND: &'static str = "child-script";

    fn apply(&self, script: &mut Self::Script, initial: bool) -> Result<(), ModifierError> {
        if initial {
            debug!(child = %self.child_id, "linked child script");
        }
        script.link_child(&self.child_id);
        Ok(())
    }
}
