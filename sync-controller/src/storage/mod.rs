//! Storage layer for the controller.
//!
//! Persists one row per satellite: identity, last known address, last
//! contact time and shared secret.

mod sqlite;

pub use sqlite::SqliteStorage;

use crate::error::StorageError;
use async_trait::async_trait;
use sync_types::Timestamp;

/// A persisted satellite row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SatelliteRecord {
    /// Unique satellite name.
    pub name: String,
    /// Last known network address (`host` or `host:port`).
    pub address: Option<String>,
    /// Seconds since epoch of the last successful contact (0 = never).
    pub last_contact: Timestamp,
    /// Shared secret used to authenticate both directions.
    pub secret: String,
}

impl SatelliteRecord {
    /// A satellite that has never been contacted.
    pub fn new(
        name: impl Into<String>,
        secret: impl Into<String>,
        address: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            address,
            last_contact: Timestamp::never(),
            secret: secret.into(),
        }
    }
}

/// Trait for satellite storage backends.
#[async_trait]
pub trait SatelliteStore: Send + Sync {
    /// Load every persisted satellite, ordered by name.
    async fn load_satellites(&self) -> Result<Vec<SatelliteRecord>, StorageError>;

    /// Get a single satellite by name.
    async fn get_satellite(&self, name: &str) -> Result<Option<SatelliteRecord>, StorageError>;

    /// Insert a new satellite row.
    ///
    /// Returns `false` and leaves the existing row untouched if the name is
    /// already taken.
    async fn insert_satellite(&self, record: &SatelliteRecord) -> Result<bool, StorageError>;

    /// Insert a satellite or replace the row with the same name.
    async fn upsert_satellite(&self, record: &SatelliteRecord) -> Result<(), StorageError>;

    /// Record a successful contact.
    ///
    /// `address` replaces the stored address when present; `None` keeps it.
    async fn record_contact(
        &self,
        name: &str,
        address: Option<&str>,
        last_contact: Timestamp,
    ) -> Result<(), StorageError>;

    /// Delete a satellite row.
    ///
    /// Returns `true` if a row was removed.
    async fn remove_satellite(&self, name: &str) -> Result<bool, StorageError>;
}
