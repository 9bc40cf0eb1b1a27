//! Error types for papercut

use std::ops::Range;
use std::path::PathBuf;

use papercut_syntax::ParseErrors;
use thiserror::Error;

/// Failures while folding parameters to constants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConcretizationError {
    /// Parameters whose values depend on each other
    #[error("parameter dependency cycle: {}", .params.join(" -> "))]
    Cycle { params: Vec<String> },

    #[error("top module `{0}` not found")]
    UnknownTop(String),

    #[error("source contains no modules")]
    NoModules,

    #[error("invalid value `{value}` for parameter override `{name}`")]
    InvalidOverride { name: String, value: String },
}

/// Two edits in one set touch the same bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("edits overlap: {first:?} and {second:?}")]
pub struct OverlapError {
    pub first: Range<usize>,
    pub second: Range<usize>,
}

/// Failures while splicing edits into a source buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("edit range {range:?} is outside the {len}-byte source or splits a character")]
    OutOfBounds { range: Range<usize>, len: usize },
}

/// Umbrella error for everything that aborts a papercut run.
#[derive(Debug, Error)]
pub enum PapercutError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseErrors),

    #[error("concretization failed: {0}")]
    Concretization(#[from] ConcretizationError),

    #[error(transparent)]
    Overlap(#[from] OverlapError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PapercutError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for papercut operations
pub type PapercutResult<T> = Result<T, PapercutError>;
