//! Embedded store adapter over SQLite.
//!
//! One [`Database`] owns one connection behind a mutex. Every read and every
//! transaction takes the lock for its whole duration, so a reader observes
//! either the state before a multi-table write or the state after it.
//! Blocking SQLite work runs on tokio's blocking pool.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, Transaction};
use tracing::info;

use crate::error::{Result, StoreError};
use crate::migration;

/// File extension of database files under a storage root.
pub const DATABASE_EXTENSION: &str = "sqlite";

/// Connection pragmas applied at open.
const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = FULL;
"#;

/// A named SQLite database with its schema migrated to the latest version.
pub struct Database {
    name: String,
    path: Option<PathBuf>,
    /// `None` once closed.
    conn: Arc<Mutex<Option<Connection>>>,
}

impl Database {
    /// Path of the database called `name` under `root`.
    pub fn path_for(root: impl AsRef<Path>, name: &str) -> PathBuf {
        root.as_ref().join(format!("{name}.{DATABASE_EXTENSION}"))
    }

    /// Whether a database called `name` exists under `root`.
    pub fn exists(root: impl AsRef<Path>, name: &str) -> bool {
        Self::path_for(root, name).is_file()
    }

    /// Open (or create) the database called `name` under `root`.
    ///
    /// Runs every pending migration before returning. A failing migration
    /// aborts the open.
    pub fn open(root: impl AsRef<Path>, name: &str) -> Result<Self> {
        std::fs::create_dir_all(root.as_ref())?;
        let path = Self::path_for(root, name);
        let mut conn = Connection::open(&path)?;
        conn.execute_batch(PRAGMAS)?;
        let version = migration::migrate(&mut conn)?;

        info!(name, path = %path.display(), version, "database opened");

        Ok(Self {
            name: name.to_string(),
            path: Some(path),
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// Open an in-memory database.
    ///
    /// Useful for testing.
    pub fn open_memory(name: &str) -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            name: name.to_string(),
            path: None,
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// File backing the database, `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` against the connection without opening a transaction.
    pub async fn read<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.blocking(move |conn| f(conn)).await
    }

    /// Run `f` atomically: committed if it returns `Ok`, rolled back otherwise.
    pub async fn run_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let out = f(&tx)?;
            tx.commit()?;
            Ok(out)
        })
        .await
    }

    /// Run a migration-level operation that needs the connection mutably.
    pub async fn with_connection_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.blocking(f).await
    }

    /// Close the connection. Later operations fail with `StoreError::Runtime`.
    pub async fn close(&self) -> Result<()> {
        let conn = self.conn.clone();
        let name = self.name.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&conn)?;
            if let Some(conn) = guard.take() {
                conn.close().map_err(|(_, e)| StoreError::Database(e))?;
                info!(name = %name, "database closed");
            }
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Runtime(format!("spawn_blocking failed: {}", e)))?
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&conn)?;
            let conn = guard
                .as_mut()
                .ok_or_else(|| StoreError::Runtime("database is closed".to_string()))?;
            f(conn)
        })
        .await
        .map_err(|e| StoreError::Runtime(format!("spawn_blocking failed: {}", e)))?
    }
}

fn lock(conn: &Mutex<Option<Connection>>) -> Result<std::sync::MutexGuard<'_, Option<Connection>>> {
    conn.lock()
        .map_err(|e| StoreError::Runtime(format!("mutex poisoned: {}", e)))
}
