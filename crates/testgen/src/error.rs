use thiserror::Error;

#[derive(Error, Debug)]
pub enum TestGenError {
    #[error("SQLite connection error: {0}")]
    Connection(rusqlite::Error),

    #[error("SQLite query error: {0}")]
    Query(rusqlite::Error),

    #[error("SQLite insert error: {0}")]
    Insert(rusqlite::Error),

    #[error("Config not found: {0}")]
    NotFound(String),

    #[error("Schema migration failed: {0}")]
    Migration(rusqlite::Error),

    #[error("Chat provider failure: {0}")]
    Provider(#[from] llm::LlmError),

    #[error("Model returned unusable output: {0}")]
    BadModelOutput(String),

    #[error("Environment probe failed: {0}")]
    Environment(#[from] std::io::Error),
}
