use core_types::CoreError;
use database::DbError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Invalid analytics request: {0}")]
    Validation(String),

    #[error("No data available: {0}")]
    NotFound(String),

    #[error("Not enough data to perform calculation: {0}")]
    InsufficientData(String),

    #[error("Analytics storage error: {0}")]
    Database(DbError),
}

impl From<DbError> for AnalyticsError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => AnalyticsError::NotFound(what),
            DbError::Validation(e) => AnalyticsError::Validation(e.to_string()),
            other => AnalyticsError::Database(other),
        }
    }
}

impl From<CoreError> for AnalyticsError {
    fn from(err: CoreError) -> Self {
        AnalyticsError::Validation(err.to_string())
    }
}
