use thiserror::Error;

use crate::validator::ValidationError;

#[derive(Error, Debug)]
pub enum AtifError {
    #[error("Validation error: {0}")]
    Validation(ValidationError),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
