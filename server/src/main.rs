use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use todo_core::{SqliteStore, TodoStore};
use todo_server::{AppState, Config};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    config.logging.init()?;

    let store = SqliteStore::connect(config.connect_options())
        .await
        .with_context(|| format!("failed to open database {}", config.db_path.display()))?;
    let store: Arc<dyn TodoStore> = Arc::new(store);

    match store.get_all().await {
        Ok(todos) => info!(count = todos.len(), "todos in database"),
        Err(err) => warn!(error = %err, "could not count todos"),
    }

    let addr = config.listen_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    let state = AppState::new(Arc::clone(&store), config.request_timeout);
    let served = todo_server::run(listener, state, shutdown_signal()).await;

    store.close().await.context("failed to close database")?;
    served.context("server error")?;
    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
