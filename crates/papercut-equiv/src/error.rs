//! Error types for equivalence checking

use std::path::PathBuf;

use papercut::PapercutError;
use thiserror::Error;

/// Why a single verifier run could not produce a verdict.
///
/// These never abort a batch; the orchestrator turns them into an `Error`
/// result for the affected mutant.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("verifier program `{0}` not found")]
    ProgramNotFound(String),

    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for verifier: {0}")]
    Wait(#[source] std::io::Error),

    #[error("cannot read script template {path}: {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot prepare mutant: {0}")]
    Prepare(#[from] PapercutError),
}

/// Errors that stop equivalence checking before any verifier runs.
#[derive(Debug, Error)]
pub enum EquivError {
    #[error("cannot read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid {which} marker `{pattern}`: {source}")]
    Marker {
        which: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("custom profile requires a `program`")]
    MissingProgram,

    #[error("max_concurrent must be at least 1")]
    ZeroConcurrency,

    #[error(transparent)]
    Design(#[from] PapercutError),
}

/// Result type for orchestrator setup
pub type EquivResult<T> = Result<T, EquivError>;
