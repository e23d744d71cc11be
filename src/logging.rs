//! Per-run log record and the capabilities log modifiers operate on.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::ModifierError;
use crate::site::ANONYMOUS;

/// Outcome of a script run.
///
/// Records written by older hosts may contain `"Paused"`; it reads back as
/// [`ScriptOutcome::Active`] and is never written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptOutcome {
    /// Completed normally.
    Success,
    /// The script reported failure.
    Failure,
    /// Cancelled from outside.
    Aborted,
    /// Still running.
    #[serde(alias = "Paused")]
    Active,
    /// Ended by an engine or structural error.
    Error,
}

impl ScriptOutcome {
    /// Everything but [`ScriptOutcome::Active`].
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ScriptOutcome::Active)
    }
}

impl fmt::Display for ScriptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScriptOutcome::Success => "Success",
            ScriptOutcome::Failure => "Failure",
            ScriptOutcome::Aborted => "Aborted",
            ScriptOutcome::Active => "Active",
            ScriptOutcome::Error => "Error",
        };
        f.write_str(name)
    }
}

/// Stored description of one attached log modifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifierRecord {
    /// Modifier kind, used to find its replay constructor.
    pub kind: String,
    /// Serialized modifier.
    pub state: JsonValue,
}

/// Log record of one script execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptLoggingResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    script_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    script_id: Option<String>,
    result: ScriptOutcome,
    started: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    finished: Option<DateTime<Utc>>,
    details: String,
    #[serde(default)]
    children: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    group_complete: Option<bool>,
    #[serde(default = "anonymous")]
    user: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    annotations: BTreeMap<String, JsonValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    modifiers: Vec<ModifierRecord>,
}

fn anonymous() -> String {
    ANONYMOUS.to_string()
}

impl ScriptLoggingResult {
    /// Open an `Active` record stamped with the current time.
    pub fn start(
        script_name: Option<String>,
        script_id: Option<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            script_name,
            script_id,
            result: ScriptOutcome::Active,
            started: Utc::now(),
            finished: None,
            details: String::new(),
            children: Vec::new(),
            group_complete: None,
            user: user.into(),
            annotations: BTreeMap::new(),
            modifiers: Vec::new(),
        }
    }

    /// Close the record with a terminal outcome.
    ///
    /// Fails if the record is already finished or `outcome` is `Active`.
    pub(crate) fn finish(
        &mut self,
        outcome: ScriptOutcome,
        details: impl Into<String>,
    ) -> Result<(), ModifierError> {
        if self.is_finished() || !outcome.is_terminal() {
            return Err(ModifierError::AlreadyFinished);
        }
        self.result = outcome;
        self.details = details.into();
        self.finished = Some(Utc::now());
        Ok(())
    }

    pub(crate) fn set_group_complete(&mut self, complete: bool) {
        if !self.is_finished() {
            self.group_complete = Some(complete);
        }
    }

    /// Whether `finished` is set.
    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    /// Script name.
    pub fn script_name(&self) -> Option<&str> {
        self.script_name.as_deref()
    }

    /// Script id.
    pub fn script_id(&self) -> Option<&str> {
        self.script_id.as_deref()
    }

    /// Current outcome.
    pub fn result(&self) -> ScriptOutcome {
        self.result
    }

    /// When the run started.
    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }

    /// When the run finished.
    pub fn finished(&self) -> Option<DateTime<Utc>> {
        self.finished
    }

    /// Outcome details.
    pub fn details(&self) -> &str {
        &self.details
    }

    /// Ids of sub-executions spawned by this run, in spawn order.
    pub fn children(&self) -> &[String] {
        &self.children
    }

    /// Whether every sub-execution reached a terminal outcome.
    pub fn group_complete(&self) -> Option<bool> {
        self.group_complete
    }

    /// Attributed user.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Annotations written by log modifiers.
    pub fn annotations(&self) -> &BTreeMap<String, JsonValue> {
        &self.annotations
    }

    /// Modifiers attached during the live run, in attachment order.
    pub fn modifier_records(&self) -> &[ModifierRecord] {
        &self.modifiers
    }

    pub(crate) fn push_modifier_record(&mut self, record: ModifierRecord) {
        self.modifiers.push(record);
    }
}

/// Read and write annotations on a script's log.
pub trait Annotate {
    /// Current annotation under `key`.
    fn annotation(&self, key: &str) -> Option<&JsonValue>;
    /// Set the annotation under `key`.
    fn annotate(&mut self, key: &str, value: JsonValue);
}

/// Read and extend a script's list of sub-executions.
pub trait ChildScripts {
    /// Linked child ids.
    fn child_ids(&self) -> &[String];
    /// Link `id`; linking an already linked id has no effect.
    fn link_child(&mut self, id: &str);
}

impl Annotate for ScriptLoggingResult {
    fn annotation(&self, key: &str) -> Option<&JsonValue> {
        self.annotations.get(key)
    }

    fn annotate(&mut self, key: &str, value: JsonValue) {
        self.annotations.insert(key.to_string(), value);
    }
}

impl ChildScripts for ScriptLoggingResult {
    fn child_ids(&self) -> &[String] {
        &self.children
    }

    fn link_child(&mut self, id: &str) {
        if !self.children.iter().any(|c| c == id) {
            self.children.push(id.to_string());
        }
    }
}
