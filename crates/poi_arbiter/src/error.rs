//! Crate-level error aggregating the per-layer errors.

use crate::chain::{CacheError, FetchError, NormalizeError, SubmitError};
use crate::config::ConfigError;
use crate::dispute::payload::DecodeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("fetch: {0}")]
    Fetch(#[from] FetchError),
    #[error("invalid: {0}")]
    Validation(String),
    #[error("statute of limitations: {0}")]
    StatuteExpired(String),
    #[error("decode: {0}")]
    Decode(#[from] DecodeError),
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("submit: {0}")]
    Submit(#[from] SubmitError),
    #[error("cache: {0}")]
    Cache(#[from] CacheError),
}

impl From<NormalizeError> for Error {
    fn from(e: NormalizeError) -> Self {
        Error::Validation(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
