use axum::http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Feed fetch failed: {0}")]
    Fetch(String),

    #[error("Feed parsing error: {0}")]
    Parse(String),

    #[error("Invalid news item: {0}")]
    Validation(String),

    #[error("News already exists: {title} ({link})")]
    Conflict { title: String, link: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("An ingestion run is already in progress")]
    IngestInProgress,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Fetch(_) | Error::Parse(_) => StatusCode::BAD_GATEWAY,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Conflict { .. } | Error::IngestInProgress => StatusCode::CONFLICT,
            Error::Store(_) | Error::Serialization(_) | Error::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
