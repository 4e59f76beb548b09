use core_types::CoreError;
use database::DbError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid ledger request: {0}")]
    Validation(String),

    #[error("Ledger storage error: {0}")]
    Database(#[from] DbError),
}

impl From<CoreError> for LedgerError {
    fn from(err: CoreError) -> Self {
        LedgerError::Validation(err.to_string())
    }
}
