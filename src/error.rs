use thiserror::Error;

#[derive(Error, Debug)]
pub enum SentinelError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Search failed: {0}")]
    Search(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Invalid region: {0}")]
    UnknownRegion(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Request error: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}
