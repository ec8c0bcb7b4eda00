//! Storage core for the todo service.
//!
//! # Overview
//! Defines the `Todo` record, the `TodoStore` capability the HTTP layer is
//! written against, and `SqliteStore`, the backend compiled into the server.
//!
//! # Design
//! - `TodoStore` is an async trait object so handlers never name a backend.
//! - Errors form a closed set: `NotFound` for a missing id, `Storage` for
//!   everything the backend can fail with. Request validation lives in the
//!   server crate.
//! - No caching: every read goes to the database.

pub mod error;
pub mod sqlite;
pub mod store;
pub mod types;

pub use error::{ErrorKind, Result, StoreError};
pub use sqlite::{ConnectOptions, SqliteStore};
pub use store::TodoStore;
pub use types::Todo;
