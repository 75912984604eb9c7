//! SQLite connection setup for the state database
//!
//! Both constructors end in the same place: a [`SqlitePool`] with the
//! schema applied. On disk the database runs in WAL mode with
//! `synchronous = FULL`, so once `put_record` returns the row is on stable
//! storage. The in-memory variant exists for tests.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use tracing::{debug, info};

use crate::CacheError;

/// Connections kept for an on-disk database
const FILE_POOL_SIZE: u32 = 5;

/// How long a writer waits on another process's lock before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Applied to every fresh database; each statement is idempotent.
const SCHEMA: &str = include_str!("migrations/20261018_initial.sql");

pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Open (or create) the database file at `db_path`
    ///
    /// Missing parent directories are created first.
    ///
    /// # Errors
    /// [`CacheError::ConnectionFailed`] when the directory or file cannot be
    /// opened, [`CacheError::MigrationFailed`] when the schema cannot be applied.
    pub async fn new(db_path: &Path) -> Result<Self, CacheError> {
        ensure_parent_dir(db_path)?;

        let pool = SqlitePoolOptions::new()
            .max_connections(FILE_POOL_SIZE)
            .connect_with(durable_options(db_path))
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!("cannot open {}: {e}", db_path.display()))
            })?;

        let opened = Self::with_schema(pool).await?;
        info!(path = %db_path.display(), "State database ready");
        Ok(opened)
    }

    /// Private database that disappears with the pool
    ///
    /// SQLite gives each connection its own `:memory:` database, so the pool
    /// is capped at a single connection.
    pub async fn in_memory() -> Result<Self, CacheError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| CacheError::ConnectionFailed(format!("in-memory database: {e}")))?;

        let opened = Self::with_schema(pool).await?;
        debug!("In-memory state database ready");
        Ok(opened)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every connection; on disk this checkpoints the WAL
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn with_schema(pool: SqlitePool) -> Result<Self, CacheError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| CacheError::MigrationFailed(format!("state schema: {e}")))?;
        Ok(Self { pool })
    }
}

fn ensure_parent_dir(db_path: &Path) -> Result<(), CacheError> {
    match db_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir).map_err(|e| {
            CacheError::ConnectionFailed(format!("cannot create {}: {e}", dir.display()))
        }),
        _ => Ok(()),
    }
}

fn durable_options(db_path: &Path) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .busy_timeout(BUSY_TIMEOUT)
}
