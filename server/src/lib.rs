//! HTTP front end for the todo store.
//!
//! # Design
//! Handlers only see `Arc<dyn TodoStore>` inside [`AppState`], so the backend
//! is chosen once by whoever builds the state. The store is owned by the
//! process, not a global; `main` closes it after the server drains.

pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod middleware;

use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use todo_core::TodoStore;

use crate::handlers::{create_todo, delete_todo, get_todo, list_todos, update_todo};

pub use crate::config::Config;
pub use crate::error::ApiError;

/// Shared per-request state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TodoStore>,
    /// Upper bound on any single store call.
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(store: Arc<dyn TodoStore>, request_timeout: Duration) -> Self {
        Self {
            store,
            request_timeout,
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/todos", get(list_todos).post(create_todo))
        .route("/todos/{id}", get(get_todo).put(update_todo).delete(delete_todo))
        .layer(axum::middleware::from_fn(middleware::log_requests))
        .with_state(state)
}

/// Serve until `shutdown` resolves, then wait for in-flight requests.
pub async fn run(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}
