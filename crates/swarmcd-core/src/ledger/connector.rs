//! Storage capability used by the revision ledger.
//!
//! [`Connector`] is the narrow surface the ledger needs from a backing store:
//! open, close, ping, execute and query. [`SqliteConnector`] is the only
//! production implementation; reconnection lives in
//! [`super::reconnect::Reconnecting`], not here.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::{Connection, Row, ToSql};

use crate::error::{Result, SwarmcdError};

/// How long a writer waits on SQLite's internal lock before failing with
/// `SQLITE_BUSY`.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub trait Connector: Send + Sync {
    /// Open (or reopen) the store. Must be idempotent.
    fn open(&self) -> Result<()>;

    /// Drop the underlying handle. Later operations fail until `open`.
    fn close(&self);

    /// Cheap liveness check.
    fn ping(&self) -> Result<()>;

    /// Run one statement, returning the number of affected rows.
    fn execute(&self, sql: &str, params: &[&dyn ToSql]) -> Result<usize>;

    /// Run a query, calling `on_row` for each result row.
    fn query(
        &self,
        sql: &str,
        params: &[&dyn ToSql],
        on_row: &mut dyn FnMut(&Row<'_>) -> rusqlite::Result<()>,
    ) -> Result<()>;
}

// ---------------------------------------------------------------------------
// SqliteConnector
// ---------------------------------------------------------------------------

/// A single SQLite connection in WAL mode with a busy timeout.
///
/// `rusqlite::Connection` is not `Sync`, so the handle sits behind a mutex.
/// The optional schema batch runs on every open.
pub struct SqliteConnector {
    location: String,
    schema: Option<&'static str>,
    conn: Mutex<Option<Connection>>,
}

impl SqliteConnector {
    /// Create an unopened connector for `location`.
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            schema: None,
            conn: Mutex::new(None),
        }
    }

    pub fn with_schema(mut self, schema: &'static str) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn is_open(&self) -> bool {
        self.handle().is_some()
    }

    fn handle(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn connect(&self) -> std::result::Result<Connection, String> {
        let path = Path::new(&self.location);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        let conn = Connection::open(path).map_err(|e| e.to_string())?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(|e| e.to_string())?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))
            .map_err(|e| format!("failed to enable WAL: {e}"))?;
        if let Some(schema) = self.schema {
            conn.execute_batch(schema)
                .map_err(|e| format!("failed to create schema: {e}"))?;
        }
        Ok(conn)
    }
}

impl Connector for SqliteConnector {
    fn open(&self) -> Result<()> {
        let conn = self.connect().map_err(|reason| SwarmcdError::StorageInit {
            location: self.location.clone(),
            reason,
        })?;
        *self.handle() = Some(conn);
        tracing::debug!(location = %self.location, "revision store opened");
        Ok(())
    }

    fn close(&self) {
        if let Some(conn) = self.handle().take() {
            if let Err((_, e)) = conn.close() {
                tracing::debug!(error = %e, "revision store did not close cleanly");
            }
        }
    }

    fn ping(&self) -> Result<()> {
        let guard = self.handle();
        let conn = guard.as_ref().ok_or(SwarmcdError::NotConnected)?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map(|_| ())
            .map_err(|e| SwarmcdError::Storage(format!("ping failed: {e}")))
    }

    fn execute(&self, sql: &str, params: &[&dyn ToSql]) -> Result<usize> {
        let guard = self.handle();
        let conn = guard.as_ref().ok_or(SwarmcdError::NotConnected)?;
        conn.execute(sql, params)
            .map_err(|e| SwarmcdError::Storage(e.to_string()))
    }

    fn query(
        &self,
        sql: &str,
        params: &[&dyn ToSql],
        on_row: &mut dyn FnMut(&Row<'_>) -> rusqlite::Result<()>,
    ) -> Result<()> {
        let guard = self.handle();
        let conn = guard.as_ref().ok_or(SwarmcdError::NotConnected)?;
        let storage = |e: rusqlite::Error| SwarmcdError::Storage(e.to_string());

        let mut stmt = conn.prepare(sql).map_err(storage)?;
        let mut rows = stmt.query(params).map_err(storage)?;
        while let Some(row) = rows.next().map_err(storage)? {
            on_row(row).map_err(storage)?;
        }
        Ok(())
    }
}
