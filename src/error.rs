use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while resolving, reading, and assembling housekeeping data.
#[derive(Debug, Error)]
pub enum HkError {
    /// The requested window is not bracketed by the catalog.
    #[error("window not covered by catalog: {0}")]
    Range(String),
    #[error("cannot read {}: {reason}", path.display())]
    DataAccess { path: PathBuf, reason: String },
    #[error("pipeline state error: {0}")]
    State(String),
    #[error("extraction cancelled")]
    Cancelled,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("export failed: {0}")]
    Export(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl HkError {
    pub fn data_access(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        HkError::DataAccess {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HkError>;
