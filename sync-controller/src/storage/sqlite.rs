//! SQLite storage backend for the controller.

use super::{SatelliteRecord, SatelliteStore};
use crate::error::StorageError;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use sync_types::Timestamp;

/// SQLite-based satellite storage.
///
/// Uses WAL mode for concurrent reads/writes.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage from a database path.
    ///
    /// Creates the database file if it doesn't exist.
    pub async fn new(path: &Path) -> Result<Self, StorageError> {
        let path_str = path.to_str().ok_or_else(|| StorageError::InvalidPath {
            path: path.to_path_buf(),
        })?;

        let options = SqliteConnectOptions::from_str(path_str)
            .map_err(StorageError::Database)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Create an in-memory SQLite storage (for testing).
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(":memory:")
            .map_err(StorageError::Database)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS satellites (
                name TEXT PRIMARY KEY,
                address TEXT,
                last_contact INTEGER NOT NULL DEFAULT 0,
                secret TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(())
    }

    /// Number of persisted satellites.
    pub async fn count_satellites(&self) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM satellites")
            .fetch_one(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl SatelliteStore for SqliteStorage {
    async fn load_satellites(&self) -> Result<Vec<SatelliteRecord>, StorageError> {
        let rows = sqlx::query_as::<_, SatelliteRow>(
            r#"
            SELECT name, address, last_contact, secret
            FROM satellites
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(rows.into_iter().map(SatelliteRecord::from).collect())
    }

    async fn get_satellite(&self, name: &str) -> Result<Option<SatelliteRecord>, StorageError> {
        let row = sqlx::query_as::<_, SatelliteRow>(
            r#"
            SELECT name, address, last_contact, secret
            FROM satellites
            WHERE name = ?1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(row.map(SatelliteRecord::from))
    }

    async fn insert_satellite(&self, record: &SatelliteRecord) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            INSERT INTO satellites (name, address, last_contact, secret)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(name) DO NOTHING
            "#,
        )
        .bind(&record.name)
        .bind(record.address.as_deref())
        .bind(record.last_contact.as_secs() as i64)
        .bind(&record.secret)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    async fn upsert_satellite(&self, record: &SatelliteRecord) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO satellites (name, address, last_contact, secret)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(name) DO UPDATE SET
                address = excluded.address,
                last_contact = excluded.last_contact,
                secret = excluded.secret
            "#,
        )
        .bind(&record.name)
        .bind(record.address.as_deref())
        .bind(record.last_contact.as_secs() as i64)
        .bind(&record.secret)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(())
    }

    async fn record_contact(
        &self,
        name: &str,
        address: Option<&str>,
        last_contact: Timestamp,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE satellites
            SET last_contact = ?2, address = COALESCE(?3, address)
            WHERE name = ?1
            "#,
        )
        .bind(name)
        .bind(last_contact.as_secs() as i64)
        .bind(address)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    async fn remove_satellite(&self, name: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM satellites WHERE name = ?1")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(sqlx::FromRow)]
struct SatelliteRow {
    name: String,
    address: Option<String>,
    last_contact: i64,
    secret: String,
}

impl From<SatelliteRow> for SatelliteRecord {
    fn from(row: SatelliteRow) -> Self {
        Self {
            name: row.name,
            address: row.address.filter(|a| !a.is_empty()),
            last_contact: Timestamp::new(row.last_contact.max(0) as u64),
            secret: row.secret,
        }
    }
}
