use reqwest::StatusCode;
use std::path::PathBuf;

// Custom error type for cache proxy operations
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    UrlError(String),

    #[error("Unsafe path derived from {0}, refusing to leave the cache root")]
    PathTraversal(String),

    #[error("Directory listing requested for {0}")]
    DirectoryListing(PathBuf),

    #[error("Origin returned status code {0}")]
    FetchFailed(StatusCode),

    #[error("Timed out waiting for the download of {0}")]
    LockTimeout(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
