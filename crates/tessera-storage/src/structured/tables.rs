//! redb table definitions and storage manager
//!
//! Defines all tables used for structured storage.

use std::path::PathBuf;
use std::sync::Arc;

use redb::{Database, ReadableTable, Table, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};

use crate::error::{StorageError, StorageResult};

// Key: unique identifier bytes, Value: serialized ManagedObject
pub const OBJECTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("objects");

// Key: Name Value bytes, Value: serialized list of unique identifiers
pub const NAMES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("names");

// Key: unique identifier bytes, Value: serialized UserPermissionEntry
pub const PERMISSIONS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("permissions");

/// A table opened inside a write transaction
pub(crate) type BytesTable<'txn> = Table<'txn, &'static [u8], &'static [u8]>;

/// Map any redb error into a storage error
pub(crate) fn db_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::Io(e.to_string())
}

pub(crate) fn encode<T: Serialize>(value: &T) -> StorageResult<Vec<u8>> {
    postcard::to_allocvec(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StorageResult<T> {
    postcard::from_bytes(bytes).map_err(|e| StorageError::Deserialization(e.to_string()))
}

/// Read a value out of a write-transaction table as owned bytes
pub(crate) fn read_owned(table: &BytesTable<'_>, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
    Ok(table.get(key).map_err(db_err)?.map(|v| v.value().to_vec()))
}

/// Configuration for redb storage
#[derive(Debug, Clone)]
pub struct RedbStorageConfig {
    /// Path to the database file
    pub db_path: PathBuf,
    /// Cache size in bytes
    pub cache_size: usize,
}

impl Default for RedbStorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/tessera.redb"),
            cache_size: 64 * 1024 * 1024, // 64MB
        }
    }
}

/// Main redb storage manager
pub struct RedbStorage {
    db: Arc<Database>,
    config: RedbStorageConfig,
}

impl RedbStorage {
    /// Open or create the database
    #[instrument(skip(config), fields(path = %config.db_path.display()))]
    pub fn open(config: RedbStorageConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::builder()
            .set_cache_size(config.cache_size)
            .create(&config.db_path)
            .map_err(db_err)?;

        info!("Opened redb database");

        let storage = Self {
            db: Arc::new(db),
            config,
        };

        storage.init_tables()?;

        Ok(storage)
    }

    /// Initialize all tables
    fn init_tables(&self) -> StorageResult<()> {
        let write_txn = self.db.begin_write().map_err(db_err)?;

        // Create tables if they don't exist
        write_txn.open_table(OBJECTS).map_err(db_err)?;
        write_txn.open_table(NAMES).map_err(db_err)?;
        write_txn.open_table(PERMISSIONS).map_err(db_err)?;

        write_txn.commit().map_err(db_err)?;

        debug!("Initialized redb tables");
        Ok(())
    }

    /// Get a reference to the database
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Get the configuration
    pub fn config(&self) -> &RedbStorageConfig {
        &self.config
    }

    /// Put a key-value pair in a table
    pub fn put(
        &self,
        table: TableDefinition<&[u8], &[u8]>,
        key: &[u8],
        value: &[u8],
    ) -> StorageResult<()> {
        let write_txn = self.db.begin_write().map_err(db_err)?;

        {
            let mut table = write_txn.open_table(table).map_err(db_err)?;
            table.insert(key, value).map_err(db_err)?;
        }

        write_txn.commit().map_err(db_err)?;

        Ok(())
    }

    /// Get a value from a table
    pub fn get(
        &self,
        table: TableDefinition<&[u8], &[u8]>,
        key: &[u8],
    ) -> StorageResult<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read().map_err(db_err)?;

        let table = read_txn.open_table(table).map_err(db_err)?;

        let value = table
            .get(key)
            .map_err(db_err)?
            .map(|v| v.value().to_vec());

        Ok(value)
    }

    /// Every value in a table
    pub fn values(&self, table: TableDefinition<&[u8], &[u8]>) -> StorageResult<Vec<Vec<u8>>> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(table).map_err(db_err)?;

        let mut results = Vec::new();
        for entry in table.iter().map_err(db_err)? {
            let (_, value) = entry.map_err(db_err)?;
            results.push(value.value().to_vec());
        }
        Ok(results)
    }
}
