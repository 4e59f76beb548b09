use core_types::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Failed to load environment variables for database connection: {0}")]
    ConnectionConfigError(String),

    #[error("Database query failed: {0}")]
    QueryError(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("An error occurred during JSON serialization/deserialization: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Rejected by the store: {0}")]
    Validation(#[from] CoreError),

    #[error("The requested data was not found: {0}")]
    NotFound(String),

    #[error("Store call '{operation}' was cancelled: request deadline exceeded")]
    Cancelled { operation: &'static str },
}
