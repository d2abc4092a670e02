use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchivistError {
    #[error("SQLite connection error: {0}")]
    Connection(rusqlite::Error),

    #[error("SQLite query error: {0}")]
    Query(rusqlite::Error),

    #[error("SQLite insert error: {0}")]
    Insert(rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Schema migration failed: {0}")]
    Migration(rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Chat provider failure: {0}")]
    Provider(#[from] llm::LlmError),
}
