use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::debug;
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use tempfile::NamedTempFile;
use thiserror::Error;

use super::block::Block;
use super::crypto::Address;
use super::transaction::Transaction;

const SNAPSHOT_KEY: &str = "snapshot";

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Failed to replace state file: {0}")]
    PersistError(String),
}

/// Borrowed view of the whole ledger, written after every decision
#[derive(Debug, Serialize)]
pub struct SnapshotView<'a> {
    pub chain: &'a [Block],
    pub pending: &'a [Transaction],
    pub balances: &'a BTreeMap<Address, f64>,
}

impl SnapshotView<'_> {
    pub fn to_snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            chain: self.chain.to_vec(),
            pending: self.pending.to_vec(),
            balances: self.balances.clone(),
        }
    }
}

/// The persisted ledger document
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LedgerSnapshot {
    pub chain: Vec<Block>,
    pub pending: Vec<Transaction>,
    pub balances: BTreeMap<Address, f64>,
}

/// Durable home of the ledger snapshot.
///
/// `save` must replace the previous snapshot entirely or fail leaving it
/// intact.
pub trait Storage: Send + Sync + fmt::Debug {
    fn save(&self, snapshot: &SnapshotView<'_>) -> Result<(), StorageError>;

    /// Returns `None` when nothing has been stored yet
    fn load(&self) -> Result<Option<LedgerSnapshot>, StorageError>;
}

/// Which backend holds the snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Sled,
    Memory,
}

/// Opens the configured backend
pub fn open_storage(backend: StorageBackend, path: &Path) -> Result<Box<dyn Storage>, StorageError> {
    let storage: Box<dyn Storage> = match backend {
        StorageBackend::File => Box::new(FileStorage::new(path)),
        StorageBackend::Sled => Box::new(SledStorage::new(path)?),
        StorageBackend::Memory => Box::new(MemoryStorage::new()),
    };
    Ok(storage)
}

/// Pretty JSON document on disk, replaced atomically on every save
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileStorage {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn directory(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

impl Storage for FileStorage {
    fn save(&self, snapshot: &SnapshotView<'_>) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        // The temp file lives next to the target so the rename stays on one filesystem
        let directory = self.directory();
        fs::create_dir_all(&directory)?;
        let mut file = NamedTempFile::new_in(&directory)?;
        file.write_all(&bytes)?;
        file.as_file().sync_all()?;
        file.persist(&self.path)
            .map_err(|e| StorageError::PersistError(e.error.to_string()))?;

        debug!("Wrote ledger snapshot to {}", self.path.display());
        Ok(())
    }

    fn load(&self) -> Result<Option<LedgerSnapshot>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&self.path)?;
        let snapshot = serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::DeserializationError(e.to_string()))?;
        Ok(Some(snapshot))
    }
}

/// Snapshot stored under a single key in a sled tree
pub struct SledStorage {
    db: Db,
    tree: Tree,
}

impl fmt::Debug for SledStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SledStorage").finish()
    }
}

impl SledStorage {
    /// Opens (or creates) the database directory at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        let tree = db.open_tree("ledger")?;
        Ok(SledStorage { db, tree })
    }
}

impl Storage for SledStorage {
    fn save(&self, snapshot: &SnapshotView<'_>) -> Result<(), StorageError> {
        let value = bincode::serialize(snapshot)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        self.tree.insert(SNAPSHOT_KEY, value)?;
        self.db.flush()?;
        Ok(())
    }

    fn load(&self) -> Result<Option<LedgerSnapshot>, StorageError> {
        match self.tree.get(SNAPSHOT_KEY)? {
            Some(value) => {
                let snapshot = bincode::deserialize(&value)
                    .map_err(|e| StorageError::DeserializationError(e.to_string()))?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }
}

/// Keeps the snapshot in process memory
#[derive(Debug, Default)]
pub struct MemoryStorage {
    snapshot: Mutex<Option<LedgerSnapshot>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn save(&self, snapshot: &SnapshotView<'_>) -> Result<(), StorageError> {
        let mut slot = self.snapshot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(snapshot.to_snapshot());
        Ok(())
    }

    fn load(&self) -> Result<Option<LedgerSnapshot>, StorageError> {
        let slot = self.snapshot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(slot.clone())
    }
}
