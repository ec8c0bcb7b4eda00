//! Request handlers for the `/todos` resource.
//!
//! Each handler validates its input, makes exactly one store call bounded by
//! the request deadline, and maps the outcome to a response. No retries.

use std::future::Future;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use todo_core::{StoreError, Todo};

use crate::error::ApiError;
use crate::AppState;

/// Parse a path segment as a positive todo id.
pub fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid id: {raw:?}")))
}

/// Decode a JSON todo body. Missing fields take their zero values.
pub fn parse_body(body: &[u8]) -> Result<Todo, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid request body: {e}")))
}

impl AppState {
    /// Await a store call, giving up once the request deadline passes.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = todo_core::Result<T>>,
    ) -> Result<T, ApiError> {
        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => Ok(result?),
            Err(elapsed) => Err(StoreError::storage("request deadline", elapsed).into()),
        }
    }
}

pub async fn list_todos(State(state): State<AppState>) -> Result<Json<Vec<Todo>>, ApiError> {
    let todos = state.bounded(state.store.get_all()).await?;
    Ok(Json(todos))
}

pub async fn get_todo(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<Todo>, ApiError> {
    let id = parse_id(&raw_id)?;
    let todo = state.bounded(state.store.get_by_id(id)).await?;
    Ok(Json(todo))
}

pub async fn create_todo(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Todo>, ApiError> {
    let input = parse_body(&body)?;
    let todo = state.bounded(state.store.add(input)).await?;
    Ok(Json(todo))
}

pub async fn update_todo(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    body: Bytes,
) -> Result<Json<Todo>, ApiError> {
    let id = parse_id(&raw_id)?;
    let mut todo = parse_body(&body)?;
    if todo.id != 0 && todo.id != id {
        return Err(ApiError::BadRequest(format!(
            "id in body ({}) does not match id in path ({id})",
            todo.id
        )));
    }
    todo.id = id;

    state.bounded(state.store.update(&todo)).await?;
    Ok(Json(todo))
}

pub async fn delete_todo(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&raw_id)?;
    state.bounded(state.store.delete(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
