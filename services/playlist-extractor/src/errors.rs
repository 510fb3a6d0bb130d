//!
//! src/errors.rs
//!
//! Defines enums and methods of error conversion
//! for errors the extractor uses
//!
//!

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("config error: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("rate limited: retry {0:?}")]
    RateLimited(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("csv error: {0}")]
    Csv(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error)
}

impl From<reqwest::Error> for ExtractorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ExtractorError::Timeout(e.to_string())
        } else {
            ExtractorError::Http(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ExtractorError {
    fn from(e: serde_json::Error) -> Self { ExtractorError::Parse(e.to_string()) }
}

impl From<csv::Error> for ExtractorError {
    fn from(e: csv::Error) -> Self { ExtractorError::Csv(e.to_string()) }
}
