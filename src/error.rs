//! Error types for parsing and running block scripts.

use std::time::Duration;
use thiserror::Error;

/// Errors raised while turning script JSON into a block tree.
///
/// Parsing is all-or-nothing: when any of these is returned no part of the
/// tree was kept, and no block has executed.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The script text is not valid JSON, or does not have the block shape.
    #[error("Invalid script JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A node names a block kind nothing was registered for.
    #[error("Unknown block kind '{kind}' at {path}")]
    UnknownKind {
        /// The unregistered kind.
        kind: String,
        /// Location of the node inside the tree.
        path: String,
    },

    /// A node is structurally invalid.
    #[error("Malformed block at {path}: {message}")]
    Malformed {
        /// Location of the node inside the tree.
        path: String,
        /// What is wrong with it.
        message: String,
    },

    /// The workspace contains no top-level block.
    #[error("Script has no root block")]
    NoRoot,

    /// The workspace contains more than one top-level block.
    #[error("Script must have a single root block, found {count}")]
    MultipleRoots {
        /// Number of top-level blocks found.
        count: usize,
    },
}

/// Errors raised while a script is being evaluated.
///
/// Each variant maps to exactly one terminal log outcome, see
/// [`ScriptError::outcome`].
#[derive(Error, Debug)]
pub enum ScriptError {
    /// The script text could not be parsed.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// A block read a value slot the parsed tree never supplied.
    #[error("Block '{kind}' ({block}) has no input '{slot}'")]
    MissingInput {
        /// Kind of the reading block.
        kind: String,
        /// Id of the reading block.
        block: String,
        /// Name of the missing slot.
        slot: String,
    },

    /// A block read a field the parsed tree never supplied.
    #[error("Block '{kind}' ({block}) has no field '{field}'")]
    MissingField {
        /// Kind of the reading block.
        kind: String,
        /// Id of the reading block.
        block: String,
        /// Name of the missing field.
        field: String,
    },

    /// A field is present but holds an unusable literal.
    #[error("Block '{kind}' has invalid field '{field}': {message}")]
    InvalidField {
        /// Kind of the reading block.
        kind: String,
        /// Name of the field.
        field: String,
        /// Why the literal was rejected.
        message: String,
    },

    /// A value had the wrong type for the operation applied to it.
    #[error("Type error: expected {expected}, got {actual}")]
    Type {
        /// Expected type.
        expected: String,
        /// Actual type.
        actual: String,
    },

    /// Generic evaluation failure inside a block.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// The script itself reported failure.
    #[error("Script failed: {0}")]
    Failed(String),

    /// The run was cancelled from outside.
    #[error("Script aborted")]
    Aborted,

    /// The run exceeded its configured time limit.
    #[error("Script timed out after {0:?}")]
    Timeout(Duration),

    /// The attached debugger rejected an interception.
    #[error("Debugger error: {0}")]
    Debugger(String),

    /// A script site service failed.
    #[error("Site error: {0}")]
    Site(String),

    /// A log modifier could not be applied.
    #[error("Log modifier error: {0}")]
    Modifier(#[from] ModifierError),
}

impl ScriptError {
    /// Log outcome a run ending with this error is recorded as.
    pub fn outcome(&self) -> crate::ScriptOutcome {
        match self {
            ScriptError::Aborted => crate::ScriptOutcome::Aborted,
            ScriptError::Failed(_) => crate::ScriptOutcome::Failure,
            _ => crate::ScriptOutcome::Error,
        }
    }
}

/// Errors raised by the log modifier pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModifierError {
    /// Live attachment to a record that already has `finished` set.
    #[error("Log record is already finished")]
    AlreadyFinished,

    /// Stored modifier state could not be decoded.
    #[error("Invalid state for modifier '{kind}': {message}")]
    InvalidState {
        /// Modifier kind.
        kind: String,
        /// Decoding failure.
        message: String,
    },

    /// No replay constructor is known for a stored modifier kind.
    #[error("Unknown log modifier kind '{0}'")]
    UnknownKind(String),
}
