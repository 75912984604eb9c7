//! SQLite implementation of ISyncStateStore
//!
//! ## Type Mapping
//!
//! | Domain Type     | SQL Type | Strategy                                              |
//! |-----------------|----------|-------------------------------------------------------|
//! | RelativePath    | TEXT     | `.as_str()` / `RelativePath::new()`, `''` is the root |
//! | FolderId/FileId | TEXT     | `.as_str()` / `::new()`                               |
//! | Fingerprint     | TEXT     | 64 hex chars via `.as_str()` / `Fingerprint::new()`   |
//! | DateTime<Utc>   | TEXT     | `to_rfc3339()` / `DateTime::parse_from_rfc3339()`     |
//!
//! Both upserts are single `INSERT .. ON CONFLICT DO UPDATE` statements, so
//! a row is either fully old or fully new.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use cloudmirror_core::domain::{
    newtypes::{FileId, Fingerprint, FolderId, RelativePath},
    RemoteFolderRef, SyncRecord,
};
use cloudmirror_core::ports::{ISyncStateStore, RecordFilter, StoreCounts};

use crate::CacheError;

/// SQLite-based implementation of the sync state store port
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Creates a new store instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

/// Parse a DateTime<Utc> from an RFC 3339 string
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // SQLite's own datetime() format
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
                .map(|ndt| ndt.and_utc())
        })
        .map_err(|e| {
            CacheError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, CacheError> {
    match s {
        Some(ref val) if !val.is_empty() => parse_datetime(val).map(Some),
        _ => Ok(None),
    }
}

fn parse_path(s: String) -> Result<RelativePath, CacheError> {
    RelativePath::new(s).map_err(|e| CacheError::SerializationError(e.to_string()))
}

/// Escape `%`, `_` and the escape character itself for a LIKE pattern
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// ============================================================================
// Row mapping functions
// ============================================================================

fn sync_record_from_row(row: &SqliteRow) -> Result<SyncRecord, CacheError> {
    let relative_path = parse_path(row.get("relative_path"))?;

    let remote_file_id = row
        .get::<Option<String>, _>("remote_file_id")
        .map(FileId::new)
        .transpose()
        .map_err(|e| CacheError::SerializationError(e.to_string()))?;

    let fingerprint = row
        .get::<Option<String>, _>("fingerprint")
        .map(Fingerprint::new)
        .transpose()
        .map_err(|e| CacheError::SerializationError(e.to_string()))?;

    let last_synced_at = parse_optional_datetime(row.get("last_synced_at"))?;

    Ok(SyncRecord::from_parts(
        relative_path,
        remote_file_id,
        fingerprint,
        last_synced_at,
    ))
}

fn folder_ref_from_row(row: &SqliteRow) -> Result<RemoteFolderRef, CacheError> {
    let relative_path = parse_path(row.get("relative_path"))?;
    let folder_id = FolderId::new(row.get("folder_id"))
        .map_err(|e| CacheError::SerializationError(e.to_string()))?;
    let created_at = parse_datetime(row.get::<&str, _>("created_at"))?;

    Ok(RemoteFolderRef::from_parts(relative_path, folder_id, created_at))
}

// ============================================================================
// ISyncStateStore implementation
// ============================================================================

#[async_trait::async_trait]
impl ISyncStateStore for SqliteStateStore {
    async fn get_record(&self, path: &RelativePath) -> anyhow::Result<Option<SyncRecord>> {
        let row = sqlx::query(
            "SELECT relative_path, remote_file_id, fingerprint, last_synced_at \
             FROM sync_records WHERE relative_path = ?",
        )
        .bind(path.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(sync_record_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn put_record(&self, record: &SyncRecord) -> anyhow::Result<()> {
        let remote_file_id = record.remote_file_id().map(|id| id.as_str().to_string());
        let fingerprint = record.last_fingerprint().map(|fp| fp.as_str().to_string());
        let last_synced_at = record.last_synced_at().map(|dt| dt.to_rfc3339());

        sqlx::query(
            "INSERT INTO sync_records \
             (relative_path, remote_file_id, fingerprint, last_synced_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(relative_path) DO UPDATE SET \
               remote_file_id = COALESCE(excluded.remote_file_id, sync_records.remote_file_id), \
               fingerprint = excluded.fingerprint, \
               last_synced_at = excluded.last_synced_at",
        )
        .bind(record.relative_path().as_str())
        .bind(&remote_file_id)
        .bind(&fingerprint)
        .bind(&last_synced_at)
        .execute(&self.pool)
        .await?;

        tracing::trace!(path = %record.relative_path(), "Sync record stored");
        Ok(())
    }

    async fn get_folder_ref(&self, path: &RelativePath) -> anyhow::Result<Option<RemoteFolderRef>> {
        let row = sqlx::query(
            "SELECT relative_path, folder_id, created_at FROM folder_refs WHERE relative_path = ?",
        )
        .bind(path.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(folder_ref_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn put_folder_ref(&self, folder: &RemoteFolderRef) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO folder_refs (relative_path, folder_id, created_at) \
             VALUES (?, ?, ?) \
             ON CONFLICT(relative_path) DO UPDATE SET \
               folder_id = excluded.folder_id, \
               created_at = excluded.created_at",
        )
        .bind(folder.relative_path().as_str())
        .bind(folder.folder_id().as_str())
        .bind(folder.created_at().to_rfc3339())
        .execute(&self.pool)
        .await?;

        tracing::trace!(
            path = %folder.relative_path(),
            folder_id = %folder.folder_id(),
            "Folder reference stored"
        );
        Ok(())
    }

    async fn list_records(&self, filter: &RecordFilter) -> anyhow::Result<Vec<SyncRecord>> {
        let mut sql = String::from(
            "SELECT relative_path, remote_file_id, fingerprint, last_synced_at \
             FROM sync_records WHERE 1=1",
        );
        let mut binds: Vec<String> = Vec::new();

        if let Some(ref prefix) = filter.path_prefix {
            if !prefix.is_root() {
                sql.push_str(" AND (relative_path = ? OR relative_path LIKE ? ESCAPE '\\')");
                binds.push(prefix.as_str().to_string());
                binds.push(format!("{}/%", escape_like(prefix.as_str())));
            }
        }

        if let Some(ref since) = filter.synced_since {
            sql.push_str(" AND last_synced_at >= ?");
            binds.push(since.to_rfc3339());
        }

        sql.push_str(" ORDER BY relative_path ASC");

        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }

        let rows = query.fetch_all(&self.pool).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(sync_record_from_row(row)?);
        }

        Ok(records)
    }

    async fn list_folder_refs(&self) -> anyhow::Result<Vec<RemoteFolderRef>> {
        let rows = sqlx::query(
            "SELECT relative_path, folder_id, created_at FROM folder_refs \
             ORDER BY relative_path ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut folders = Vec::with_capacity(rows.len());
        for row in &rows {
            folders.push(folder_ref_from_row(row)?);
        }

        Ok(folders)
    }

    async fn counts(&self) -> anyhow::Result<StoreCounts> {
        let folder_refs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM folder_refs")
            .fetch_one(&self.pool)
            .await?;
        let sync_records: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_records")
            .fetch_one(&self.pool)
            .await?;
        let synced_files: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sync_records WHERE remote_file_id IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreCounts {
            folder_refs: folder_refs as u64,
            sync_records: sync_records as u64,
            synced_files: synced_files as u64,
        })
    }
}
