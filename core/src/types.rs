//! The todo entity.
//!
//! # Design
//! A single `Todo` type serves as the stored record, the request body and the
//! response body. Every field falls back to its zero value when absent from
//! JSON, so an update body that omits `completed` writes `false` rather than
//! keeping the stored value.

use serde::{Deserialize, Serialize};

/// A single todo item.
///
/// `id == 0` marks a record that has not been persisted yet. The store is the
/// only place that assigns ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Todo {
    pub id: i64,
    pub title: String,
    pub completed: bool,
}

impl Todo {
    /// Build an unsaved todo.
    pub fn new(title: impl Into<String>, completed: bool) -> Self {
        Self {
            id: 0,
            title: title.into(),
            completed,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id != 0
    }
}
