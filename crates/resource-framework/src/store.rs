//! # Session Store
//!
//! Two key-value tiers the session manager persists credentials into:
//!
//! - **Durable** survives a process restart (a JSON file, or a map shared by
//!   every application built in the same process).
//! - **Volatile** lives only as long as the process.
//!
//! Tier writes never fail the caller: a backend that cannot persist logs a
//! warning and keeps its in-memory view.

use crate::config::SdkConfig;
use crate::error::{Result, SdkError};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// A single key-value persistence tier.
pub trait StorageBackend: Send + Sync + Debug {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
    fn clear(&self);
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl StorageBackend for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .write()
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }

    fn clear(&self) {
        self.entries.write().clear();
    }
}

/// A tier backed by a JSON object on disk, rewritten on every change.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Opens the file, starting empty when it does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                SdkError::Storage(format!("corrupt session file {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(SdkError::Storage(format!(
                    "cannot read session file {}: {e}",
                    path.display()
                )))
            }
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) {
        let written = serde_json::to_vec_pretty(entries)
            .map_err(|e| e.to_string())
            .and_then(|bytes| std::fs::write(&self.path, bytes).map_err(|e| e.to_string()));
        if let Err(error) = written {
            warn!(path = %self.path.display(), %error, "Cannot persist session tier");
        }
    }
}

impl StorageBackend for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries);
    }

    fn remove(&self, key: &str) {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_some() {
            self.flush(&entries);
        }
    }

    fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.clear();
        self.flush(&entries);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreTier {
    Durable,
    Volatile,
}

impl StoreTier {
    /// "Remember me" is purely a persistence-duration switch.
    pub fn for_remember_me(remember_me: bool) -> Self {
        if remember_me {
            StoreTier::Durable
        } else {
            StoreTier::Volatile
        }
    }

    pub fn other(self) -> Self {
        match self {
            StoreTier::Durable => StoreTier::Volatile,
            StoreTier::Volatile => StoreTier::Durable,
        }
    }
}

/// The pair of tiers one application scope persists its session into.
///
/// Cloning shares the underlying backends, which is how a second application
/// built over the same store observes what the first one persisted.
#[derive(Debug, Clone)]
pub struct SessionStore {
    durable: Arc<dyn StorageBackend>,
    volatile: Arc<dyn StorageBackend>,
}

impl SessionStore {
    pub fn new(durable: Arc<dyn StorageBackend>, volatile: Arc<dyn StorageBackend>) -> Self {
        Self { durable, volatile }
    }

    /// Both tiers in memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()), Arc::new(MemoryStorage::new()))
    }

    /// File-backed durable tier when `durable_store_path` is set.
    pub fn from_config(config: &SdkConfig) -> Result<Self> {
        let durable: Arc<dyn StorageBackend> = match &config.durable_store_path {
            Some(path) => Arc::new(FileStorage::open(path)?),
            None => Arc::new(MemoryStorage::new()),
        };
        Ok(Self::new(durable, Arc::new(MemoryStorage::new())))
    }

    pub fn tier(&self, tier: StoreTier) -> &Arc<dyn StorageBackend> {
        match tier {
            StoreTier::Durable => &self.durable,
            StoreTier::Volatile => &self.volatile,
        }
    }

    pub fn durable(&self) -> &Arc<dyn StorageBackend> {
        &self.durable
    }

    pub fn volatile(&self) -> &Arc<dyn StorageBackend> {
        &self.volatile
    }
}
