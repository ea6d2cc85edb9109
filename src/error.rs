use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EdinetError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Resource not found")]
    NotFound,

    #[error("Unexpected HTTP status {status} for URL: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("EDINET API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Empty response body")]
    EmptyBody,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid date range: {from} is after {to}")]
    InvalidRange { from: NaiveDate, to: NaiveDate },

    #[error("Invalid directory: {0}")]
    InvalidDirectory(PathBuf),

    #[error("Artifact already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("No catalog snapshot for {0}")]
    MissingSnapshot(NaiveDate),

    #[error("Malformed artifact: {0}")]
    MalformedArtifact(String),

    #[error("Unreadable markup: {0}")]
    UnreadableMarkup(String),

    #[error("No parser registered for document type {0}")]
    Unsupported(String),

    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[cfg(feature = "parse")]
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}

impl EdinetError {
    /// Whether the failure is worth another attempt.
    ///
    /// Network failures, rate limiting and server-side (5xx) answers are transient.
    /// Client-side answers (4xx), validation and parse failures are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            EdinetError::RequestError(e) => !e.is_status() && !e.is_decode() && !e.is_builder(),
            EdinetError::RateLimitExceeded => true,
            EdinetError::HttpStatus { status, .. } => *status >= 500,
            EdinetError::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(feature = "parse")]
impl From<quick_xml::Error> for EdinetError {
    fn from(error: quick_xml::Error) -> Self {
        EdinetError::UnreadableMarkup(error.to_string())
    }
}

#[cfg(feature = "parse")]
impl From<zip::result::ZipError> for EdinetError {
    fn from(error: zip::result::ZipError) -> Self {
        EdinetError::MalformedArtifact(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EdinetError>;
