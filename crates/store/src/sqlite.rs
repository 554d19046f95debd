//! SQLite query store.
//!
//! Opened read-only by default: the connection is created with
//! `SQLITE_OPEN_READONLY` and `PRAGMA query_only = ON`, so even a statement
//! that slips past the lexical guard cannot change the database.

use crate::bootstrap;
use async_trait::async_trait;
use safeq_core::error::StoreError;
use safeq_core::store::{QueryStore, RowSet, Value};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};
use std::str::FromStr;
use tracing::{debug, info};

/// A SQLite-backed [`QueryStore`].
pub struct SqliteStore {
    pool: SqlitePool,
    read_only: bool,
}

impl SqliteStore {
    /// Open a database file.
    ///
    /// With `read_only` set the file must already exist. Without it the
    /// file is created on demand and foreign keys are enforced; this mode is
    /// meant for `safeq init`, never for serving retrievals.
    pub async fn open(
        path: &str,
        read_only: bool,
        max_connections: u32,
    ) -> Result<Self, StoreError> {
        let base = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Connection(format!("Invalid SQLite path: {e}")))?;

        let options = if read_only {
            base.read_only(true).pragma("query_only", "ON")
        } else {
            base.create_if_missing(true)
                .journal_mode(SqliteJournalMode::Delete)
                .synchronous(SqliteSynchronous::Normal)
                .pragma("foreign_keys", "ON")
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to open SQLite at {path}: {e}")))?;

        info!(path, read_only, "SQLite store opened");
        Ok(Self { pool, read_only })
    }

    /// A private in-memory database with the bootstrap schema.
    ///
    /// Uses a single connection that never expires, so every statement sees
    /// the same database.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to open in-memory SQLite: {e}")))?;

        bootstrap::create_schema(&pool).await?;
        Ok(Self {
            pool,
            read_only: false,
        })
    }

    /// Wrap an existing pool (useful for testing).
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            read_only: false,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn row_values(row: &SqliteRow) -> Result<Vec<Value>, StoreError> {
        (0..row.columns().len())
            .map(|idx| decode_value(row, idx))
            .collect()
    }
}

/// Decode one cell by its runtime storage class.
fn decode_value(row: &SqliteRow, idx: usize) -> Result<Value, StoreError> {
    let column = row.columns()[idx].name().to_string();
    let unsupported = |e: sqlx::Error| StoreError::UnsupportedValue {
        column: column.clone(),
        reason: e.to_string(),
    };

    let raw = row.try_get_raw(idx).map_err(unsupported)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_string();

    let value = match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => {
            Value::Integer(row.try_get_unchecked::<i64, _>(idx).map_err(unsupported)?)
        }
        "REAL" | "NUMERIC" => {
            Value::Real(row.try_get_unchecked::<f64, _>(idx).map_err(unsupported)?)
        }
        "BLOB" => Value::Blob(row.try_get_unchecked::<Vec<u8>, _>(idx).map_err(unsupported)?),
        _ => Value::Text(row.try_get_unchecked::<String, _>(idx).map_err(unsupported)?),
    };
    Ok(value)
}

/// Map a driver error to the `kind: message` shape fed back to the model.
fn execution_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) => StoreError::execution("DatabaseError", db.message()),
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Connection(e.to_string())
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::execution("DecodeError", e.to_string())
        }
        _ => StoreError::execution("StoreError", e.to_string()),
    }
}

#[async_trait]
impl QueryStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    /// Rows of an empty result carry no column names.
    async fn fetch(&self, sql: &str) -> Result<RowSet, StoreError> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(execution_error)?;

        let columns = rows
            .first()
            .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let mut set = RowSet::new(columns);
        for row in &rows {
            set.push(Self::row_values(row)?);
        }

        debug!(rows = set.len(), "Statement executed");
        Ok(set)
    }
}
