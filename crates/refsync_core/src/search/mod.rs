//! Search indexing entry points.
//!
//! # Responsibility
//! - Keep one token entry per indexed item in lockstep with item writes.
//! - Expose whole-word queries over stored entries.

use crate::repo::document_repo::{Retryable, StoreError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod index;
pub mod tokenizer;

pub type SearchResult<T> = Result<T, SearchError>;

/// Search-layer error for index writes and entry decoding.
#[derive(Debug)]
pub enum SearchError {
    Storage(StoreError),
    InvalidData(String),
}

impl Display for SearchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid search entry: {message}"),
        }
    }
}

impl Error for SearchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<StoreError> for SearchError {
    fn from(value: StoreError) -> Self {
        Self::Storage(value)
    }
}

impl Retryable for SearchError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(err) => err.is_retryable(),
            Self::InvalidData(_) => false,
        }
    }
}
