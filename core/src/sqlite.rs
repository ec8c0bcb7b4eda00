//! SQLite-backed `TodoStore`.
//!
//! # Design
//! One rusqlite `Connection` sits behind a mutex and every operation runs on
//! tokio's blocking pool. The five CRUD statements are prepared once at
//! connect time and then served from the connection's statement cache.
//! `None` in the mutex means the store has been closed.
//!
//! Dropping an operation's future cancels it. A call still queued on the
//! mutex never runs, a running statement is interrupted, and a statement
//! waiting on a locked database file stops waiting. SQLite rolls an
//! interrupted or busy statement back, so a cancelled write leaves no trace.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rusqlite::{params, Connection, InterruptHandle, OptionalExtension};
use tracing::{debug, info, warn};

use crate::error::{DatabaseResultExt, Result, StoreError};
use crate::store::TodoStore;
use crate::types::Todo;

const CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS todos (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        completed BOOLEAN NOT NULL DEFAULT 0
    )";

const SELECT_ALL: &str = "SELECT id, title, completed FROM todos ORDER BY id";
const SELECT_BY_ID: &str = "SELECT id, title, completed FROM todos WHERE id = ?1";
const INSERT: &str = "INSERT INTO todos (title, completed) VALUES (?1, ?2) RETURNING id";
const UPDATE: &str = "UPDATE todos SET title = ?1, completed = ?2 WHERE id = ?3";
const DELETE: &str = "DELETE FROM todos WHERE id = ?1";

const STATEMENTS: [&str; 5] = [SELECT_ALL, SELECT_BY_ID, INSERT, UPDATE, DELETE];

/// Sleep between checks while another connection holds the write lock.
const BUSY_POLL: Duration = Duration::from_millis(10);

/// Where and how to open the database.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub path: PathBuf,
    /// Total open attempts before giving up. Values below 1 are treated as 1.
    pub attempts: u32,
    /// Pause between failed attempts.
    pub backoff: Duration,
    /// How long a statement waits on a locked database file before failing.
    /// Keep it below any deadline callers put on operations.
    pub busy_timeout: Duration,
}

impl ConnectOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            attempts: 5,
            backoff: Duration::from_secs(2),
            busy_timeout: Duration::from_secs(5),
        }
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }
}

/// `TodoStore` over a single SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Option<Connection>>>,
    busy_timeout: Duration,
}

impl SqliteStore {
    /// Open the database file, retrying while it is unreachable, then create
    /// the schema and prepare the statements.
    pub async fn connect(options: ConnectOptions) -> Result<Self> {
        let attempts = options.attempts.max(1);
        let started_at = Instant::now();
        info!(path = %options.path.display(), attempts, "opening todo database");

        let mut attempt = 1;
        let conn = loop {
            let path = options.path.clone();
            let opened = tokio::task::spawn_blocking(move || Connection::open(path))
                .await
                .map_err(|e| StoreError::storage("open database", e))?;
            match opened {
                Ok(conn) => break conn,
                Err(err) if attempt < attempts => {
                    warn!(attempt, attempts, error = %err, "database not ready, retrying");
                    tokio::time::sleep(options.backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(StoreError::storage("open database", err)),
            }
        };

        let busy_timeout = options.busy_timeout;
        let conn = tokio::task::spawn_blocking(move || bootstrap(conn, busy_timeout))
            .await
            .map_err(|e| StoreError::storage("initialize database", e))??;

        info!(
            path = %options.path.display(),
            duration_ms = started_at.elapsed().as_millis() as u64,
            "todo database ready"
        );
        Ok(Self::from_connection(conn, busy_timeout))
    }

    /// A private in-memory database, gone once the store is closed or dropped.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().db_context("open in-memory database")?;
        let busy_timeout = ConnectOptions::new(":memory:").busy_timeout;
        Ok(Self::from_connection(bootstrap(conn, busy_timeout)?, busy_timeout))
    }

    /// Convenience for [`SqliteStore::connect`] with default options.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect(ConnectOptions::new(path.as_ref())).await
    }

    fn from_connection(conn: Connection, busy_timeout: Duration) -> Self {
        Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            busy_timeout,
        }
    }

    /// Lock the connection slot. A panic in an earlier operation poisons the
    /// mutex but leaves the connection usable, since no transaction spans
    /// more than one statement.
    fn lock(conn: &Mutex<Option<Connection>>) -> MutexGuard<'_, Option<Connection>> {
        conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the connection on the blocking pool.
    ///
    /// Dropping the returned future cancels the call: `f` is skipped if it
    /// has not started, and interrupted if it has.
    async fn with_conn<T, F>(&self, context: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let call = Arc::new(CallState::default());
        let guard = AbandonGuard(Arc::clone(&call));
        let busy_timeout = self.busy_timeout;

        let task = tokio::task::spawn_blocking(move || {
            let slot = Self::lock(&conn);
            let Some(conn) = slot.as_ref() else {
                return Err(StoreError::storage(context, "store is closed"));
            };
            // Publish the handle before checking the flag so a concurrent
            // drop either sees the handle or is seen here.
            call.set_running(Some(conn.get_interrupt_handle()));
            if call.is_abandoned() {
                call.set_running(None);
                return Err(StoreError::storage(context, "operation cancelled"));
            }
            let result = {
                let _scope = BusyScope::enter(Arc::clone(&call), busy_timeout);
                f(conn)
            };
            call.set_running(None);
            result
        });

        let result = task.await.map_err(|e| StoreError::storage(context, e))?;
        drop(guard);
        result
    }
}

/// Cancellation state shared by one operation's future and its blocking task.
#[derive(Default)]
struct CallState {
    abandoned: AtomicBool,
    /// Set while the operation holds the connection.
    running: Mutex<Option<InterruptHandle>>,
}

impl CallState {
    fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
    }

    fn set_running(&self, handle: Option<InterruptHandle>) {
        *self.running.lock().unwrap_or_else(PoisonError::into_inner) = handle;
    }
}

/// Cancels the operation when the awaiting future is dropped. Dropping it
/// after the task finished is harmless: the handle has been cleared by then.
struct AbandonGuard(Arc<CallState>);

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        self.0.abandoned.store(true, Ordering::SeqCst);
        let running = self.0.running.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = running.as_ref() {
            handle.interrupt();
        }
    }
}

thread_local! {
    static BUSY_SCOPE: RefCell<Option<(Arc<CallState>, Instant)>> = const { RefCell::new(None) };
}

/// Lets the busy handler see which operation the current thread is running.
struct BusyScope;

impl BusyScope {
    fn enter(call: Arc<CallState>, busy_timeout: Duration) -> Self {
        let give_up_at = Instant::now() + busy_timeout;
        BUSY_SCOPE.with(|scope| *scope.borrow_mut() = Some((call, give_up_at)));
        BusyScope
    }
}

impl Drop for BusyScope {
    fn drop(&mut self) {
        BUSY_SCOPE.with(|scope| scope.borrow_mut().take());
    }
}

/// Busy handler: keep waiting for the lock until the operation is abandoned
/// or its busy timeout runs out. Returning `false` fails the statement with
/// `SQLITE_BUSY`.
fn wait_while_busy(_attempt: i32) -> bool {
    BUSY_SCOPE.with(|scope| {
        let scope = scope.borrow();
        let Some((call, give_up_at)) = scope.as_ref() else {
            return false;
        };
        if call.is_abandoned() || Instant::now() >= *give_up_at {
            return false;
        }
        std::thread::sleep(BUSY_POLL);
        !call.is_abandoned()
    })
}

/// Install the busy handler, create the table and warm the statement cache.
/// Closes the connection on failure.
fn bootstrap(conn: Connection, busy_timeout: Duration) -> Result<Connection> {
    let _scope = BusyScope::enter(Arc::default(), busy_timeout);
    let prepared = conn
        .busy_handler(Some(wait_while_busy))
        .db_context("install busy handler")
        .and_then(|()| conn.execute_batch(CREATE_TABLE).db_context("create todos table"))
        .and_then(|()| {
            for sql in STATEMENTS {
                conn.prepare_cached(sql).db_context("prepare statement")?;
            }
            Ok(())
        });

    match prepared {
        Ok(()) => Ok(conn),
        Err(err) => {
            let _ = conn.close();
            Err(err)
        }
    }
}

fn row_to_todo(row: &rusqlite::Row<'_>) -> rusqlite::Result<Todo> {
    Ok(Todo {
        id: row.get(0)?,
        title: row.get(1)?,
        completed: row.get(2)?,
    })
}

#[async_trait]
impl TodoStore for SqliteStore {
    async fn get_all(&self) -> Result<Vec<Todo>> {
        let todos = self
            .with_conn("query get_all", |conn| {
                let mut stmt = conn.prepare_cached(SELECT_ALL).db_context("prepare get_all")?;
                let rows = stmt.query_map([], row_to_todo).db_context("query get_all")?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
                    .db_context("scan get_all")
            })
            .await?;
        debug!(count = todos.len(), "fetched all todos");
        Ok(todos)
    }

    async fn get_by_id(&self, id: i64) -> Result<Todo> {
        self.with_conn("query get_by_id", move |conn| {
            let mut stmt = conn
                .prepare_cached(SELECT_BY_ID)
                .db_context("prepare get_by_id")?;
            stmt.query_row(params![id], row_to_todo)
                .optional()
                .db_context("query get_by_id")?
                .ok_or(StoreError::NotFound { id })
        })
        .await
    }

    async fn add(&self, todo: Todo) -> Result<Todo> {
        let added = self
            .with_conn("exec add", move |conn| {
                let mut stmt = conn.prepare_cached(INSERT).db_context("prepare add")?;
                let id: i64 = stmt
                    .query_row(params![todo.title, todo.completed], |row| row.get(0))
                    .db_context("exec add")?;
                Ok(Todo { id, ..todo })
            })
            .await?;
        debug!(id = added.id, "added todo");
        Ok(added)
    }

    async fn update(&self, todo: &Todo) -> Result<()> {
        let Todo {
            id,
            title,
            completed,
        } = todo.clone();
        self.with_conn("exec update", move |conn| {
            let mut stmt = conn.prepare_cached(UPDATE).db_context("prepare update")?;
            let changed = stmt
                .execute(params![title, completed, id])
                .db_context("exec update")?;
            if changed == 0 {
                return Err(StoreError::NotFound { id });
            }
            Ok(())
        })
        .await?;
        debug!(id, "updated todo");
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.with_conn("exec delete", move |conn| {
            let mut stmt = conn.prepare_cached(DELETE).db_context("prepare delete")?;
            let changed = stmt.execute(params![id]).db_context("exec delete")?;
            if changed == 0 {
                return Err(StoreError::NotFound { id });
            }
            Ok(())
        })
        .await?;
        debug!(id, "deleted todo");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut slot = Self::lock(&conn);
            let Some(conn) = slot.take() else {
                return Ok(());
            };
            conn.flush_prepared_statement_cache();
            conn.close()
                .map_err(|(_, e)| StoreError::storage("close database", e))?;
            info!("todo database closed");
            Ok(())
        })
        .await
        .map_err(|e| StoreError::storage("close database", e))?
    }
}
