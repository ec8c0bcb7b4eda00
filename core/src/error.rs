//! Error types for the todo store.
//!
//! # Design
//! `NotFound` gets a dedicated variant because callers map it to a distinct
//! outcome (HTTP 404). Everything else the backend can fail with, from a
//! broken connection to a closed store, lands in `Storage` with a short label
//! for the operation and the underlying cause.

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by `TodoStore` operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record matches the given id.
    #[error("todo {id} not found")]
    NotFound { id: i64 },

    /// Connectivity, constraint or I/O failure in the backend.
    #[error("{context}: {source}")]
    Storage {
        context: &'static str,
        #[source]
        source: BoxError,
    },
}

/// Coarse classification of a `StoreError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Storage,
}

impl StoreError {
    pub fn storage(context: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Storage {
            context,
            source: source.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Storage { .. } => ErrorKind::Storage,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// Label rusqlite failures with the operation that produced them.
pub trait DatabaseResultExt<T> {
    fn db_context(self, context: &'static str) -> Result<T>;
}

impl<T> DatabaseResultExt<T> for std::result::Result<T, rusqlite::Error> {
    fn db_context(self, context: &'static str) -> Result<T> {
        self.map_err(|e| StoreError::storage(context, e))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
