//! Error taxonomy for a cdist run.
//!
//! Every failure is fatal to the current host run. Nothing in the core
//! retries: a failed script may have left the target half-configured and
//! later objects can depend on its effects.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::object::ObjectState;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CdistError>;

#[derive(Debug, Error)]
pub enum CdistError {
    /// A manifest declared an object whose name is already registered.
    #[error("duplicate object: {name}")]
    DuplicateObject { name: String },

    #[error("object not found: {name}")]
    ObjectNotFound { name: String },

    #[error("invalid object name '{name}': {reason}")]
    InvalidObjectName { name: String, reason: String },

    #[error("manifest {} failed: {message}", .path.display())]
    ManifestFailed { path: PathBuf, message: String },

    #[error("explorer {name} failed: {message}")]
    ExplorerFailed { name: String, message: String },

    #[error("code generation for {object} ({}) failed: {message}", .script.display())]
    CodeGenFailed {
        object: String,
        script: PathBuf,
        message: String,
    },

    #[error("{side} code of {object} failed: {message}")]
    CodeExecFailed {
        object: String,
        side: &'static str,
        message: String,
    },

    /// Scheduler invariant violation: an object was run twice.
    #[error("attempting to run an already finished object: {name}")]
    AlreadyDone { name: String },

    #[error("invalid state transition of {name}: {from} -> {to}")]
    InvalidTransition {
        name: String,
        from: ObjectState,
        to: ObjectState,
    },

    /// Quiescent pass reached with objects still short of `done`.
    #[error("the following objects could not be resolved: {}", .0.join(" "))]
    UnresolvedObjects(Vec<String>),

    #[error("cyclic dependency between: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("{object} requires {requirement}, which does not exist")]
    MissingRequirement { object: String, requirement: String },

    #[error("{} timed out after {timeout:?}", .program.display())]
    Timeout { program: PathBuf, timeout: Duration },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("remote setup on {host} failed: {message}")]
    Remote { host: String, message: String },

    #[error("settings error: {0}")]
    Settings(String),

    #[error("lock error: {0}")]
    Lock(String),

    #[error("emulator: {0}")]
    Emulator(String),
}

impl CdistError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CdistError::Io {
            path: path.into(),
            source,
        }
    }
}
