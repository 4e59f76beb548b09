use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request to the rate feed failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("The rate feed returned an error: {0}")]
    ApiError(String),

    #[error("Failed to deserialize the API response: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("Invalid data format from API: {0}")]
    InvalidData(String),

    #[error("Rate feed is not configured: {0}")]
    NotConfigured(String),
}
