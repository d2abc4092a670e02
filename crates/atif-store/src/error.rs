use std::path::PathBuf;

use thiserror::Error;

/// Errors from the trajectory store and streaming writer.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Trajectory not found: {0}")]
    NotFound(String),

    #[error("Parse error in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Write error at {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Trajectory failed validation: {0}")]
    ValidationFailed(atif::ValidationError),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Writer is closed: {0}")]
    WriterClosed(String),
}

impl StoreError {
    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Parse {
            path: path.into(),
            source,
        }
    }
}
