//! The storage capability the HTTP layer programs against.
//!
//! # Design
//! Handlers only ever see `dyn TodoStore`, so the relational backend is a
//! construction-time choice. Implementations must be safe to share between
//! concurrent requests; the backend connection is the only synchronization
//! point.
//!
//! Cancellation is future-drop. A caller that abandons an operation stops
//! waiting on it, and an implementation may skip work that has not reached
//! the backend yet. Each operation is a single statement, so an abandoned
//! call never leaves a record half-written.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Todo;

#[async_trait]
pub trait TodoStore: Send + Sync {
    /// Every stored todo in insertion order. An empty store yields an empty vec.
    async fn get_all(&self) -> Result<Vec<Todo>>;

    /// Fails with `StoreError::NotFound` when no record has this id.
    async fn get_by_id(&self, id: i64) -> Result<Todo>;

    /// Persist `title` and `completed`, ignoring `todo.id`, and return the
    /// record with its freshly assigned id.
    async fn add(&self, todo: Todo) -> Result<Todo>;

    /// Overwrite `title` and `completed` of the record with `todo.id`.
    async fn update(&self, todo: &Todo) -> Result<()>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Release the backend. Idempotent; call once no operations are in flight.
    async fn close(&self) -> Result<()>;
}
