//! Reference maintenance between records.
//!
//! # Responsibility
//! - Hold per-model reference registries built at definition time.
//! - Compute added/removed reference ids between old and new state.
//! - Run compensating actions against referenced records in the caller's
//!   transaction.
//!
//! # Invariants
//! - Every action is idempotent, so a retried transaction converges to the
//!   same state.
//! - Any failing action aborts the whole delta application.

use crate::model::schema::SchemaError;
use crate::repo::document_repo::{Retryable, StoreError};
use crate::search::SearchError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod action;
pub mod associations;
pub mod delta;
pub mod engine;
pub mod registry;

pub type RefsResult<T> = Result<T, RefsError>;

#[derive(Debug)]
pub enum RefsError {
    Configuration(SchemaError),
    /// An action handler without a concrete `run` was invoked.
    UnimplementedAction(String),
    /// A tracked property held a value that is not an id.
    InvalidReference {
        property: String,
        value: String,
    },
    Storage(StoreError),
    /// Index maintenance for a record written or deleted by an action.
    Search(SearchError),
}

impl Display for RefsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration(err) => write!(f, "reference configuration error: {err}"),
            Self::UnimplementedAction(name) => write!(f, "action `{name}` is not implemented"),
            Self::InvalidReference { property, value } => {
                write!(f, "property `{property}` holds a non-id value: {value}")
            }
            Self::Storage(err) => write!(f, "{err}"),
            Self::Search(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RefsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Configuration(err) => Some(err),
            Self::Storage(err) => Some(err),
            Self::Search(err) => Some(err),
            Self::UnimplementedAction(_) | Self::InvalidReference { .. } => None,
        }
    }
}

impl From<SchemaError> for RefsError {
    fn from(value: SchemaError) -> Self {
        Self::Configuration(value)
    }
}

impl From<StoreError> for RefsError {
    fn from(value: StoreError) -> Self {
        Self::Storage(value)
    }
}

impl From<SearchError> for RefsError {
    fn from(value: SearchError) -> Self {
        Self::Search(value)
    }
}

impl Retryable for RefsError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(err) => err.is_retryable(),
            Self::Search(err) => err.is_retryable(),
            _ => false,
        }
    }
}
