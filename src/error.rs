use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Timed out after {0:?} waiting for a permit")]
    Timeout(Duration),

    #[error("Rate limiter is shut down")]
    LimiterClosed,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Initialization error: {0}")]
    Init(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
