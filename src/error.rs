use thiserror::Error;

#[derive(Error, Debug)]
pub enum NlqError {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Table '{table}' is not present in the knowledge catalog")]
    MissingCatalogEntry { table: String },

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("SQL validation failed after {attempts} attempt(s): {reason}")]
    SqlValidation { attempts: u8, reason: String },

    #[error("Task error: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<sqlx::Error> for NlqError {
    fn from(err: sqlx::Error) -> Self {
        NlqError::Database(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NlqError>;
