//! Choosing a storage engine at runtime.
//!
//! Every compiled-in adapter contributes a [`BackendRegistration`]. The
//! registry probes each one once and keeps only those whose engine works,
//! so an unusable engine is reported as
//! [`Error::BackendUnavailable`](crate::Error::BackendUnavailable) when it is
//! selected, never as a failure of unrelated operations.

use crate::backend::{BackendId, CacheStore, NodeStore, OpenMode};
use crate::cache::CacheFileHandle;
use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::file::FileHandle;

use log::{debug, warn};
use std::collections::BTreeMap;
use std::path::Path;

/// Entry points of one adapter.
#[derive(Clone, Copy)]
pub struct BackendRegistration {
    pub id: BackendId,
    /// Checks that the engine is usable in this process.
    pub probe: fn() -> anyhow::Result<()>,
    pub open_file: fn(&Path, OpenMode) -> Result<Box<dyn NodeStore>>,
    pub open_cache: fn(&Path, OpenMode) -> Result<Box<dyn CacheStore>>,
}

/// Adapters that passed their probe, keyed by identifier.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    entries: BTreeMap<BackendId, BackendRegistration>,
}

impl BackendRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every adapter compiled into this build whose probe succeeds.
    pub fn available() -> Self {
        let mut registry = Self::new();
        #[cfg(feature = "hdf5")]
        registry.register(crate::backend::hdf5::registration());
        #[cfg(feature = "zarr")]
        registry.register(crate::backend::zarr::registration());
        registry
    }

    /// Probes `entry` and keeps it on success. Returns whether it was kept.
    pub fn register(&mut self, entry: BackendRegistration) -> bool {
        match (entry.probe)() {
            Ok(()) => {
                debug!("registered backend '{}'", entry.id);
                self.entries.insert(entry.id, entry);
                true
            }
            Err(e) => {
                warn!("backend '{}' skipped: {:#}", entry.id, e);
                false
            }
        }
    }

    pub fn ids(&self) -> Vec<BackendId> {
        self.entries.keys().copied().collect()
    }

    pub fn contains(&self, id: BackendId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn get(&self, id: BackendId) -> Result<&BackendRegistration> {
        self.entries
            .get(&id)
            .ok_or_else(|| Error::unavailable(id, "not compiled in or failed its probe"))
    }
}

/// Maps a backend identifier to file factories.
pub struct BackendSelector {
    registry: BackendRegistry,
}

impl Default for BackendSelector {
    fn default() -> Self {
        Self::new(BackendRegistry::available())
    }
}

impl BackendSelector {
    pub fn new(registry: BackendRegistry) -> Self {
        BackendSelector { registry }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Factory for plain files of backend `id`.
    pub fn select(&self, id: BackendId) -> Result<FileFactory> {
        let entry = self.registry.get(id)?;
        Ok(FileFactory {
            id,
            open: entry.open_file,
        })
    }

    /// Factory for cache files of backend `id`.
    pub fn select_cache(&self, id: BackendId) -> Result<CacheFileFactory> {
        let entry = self.registry.get(id)?;
        Ok(CacheFileFactory {
            id,
            open: entry.open_cache,
        })
    }

    /// Parses a textual identifier, then selects it.
    pub fn select_by_name(&self, name: &str) -> Result<FileFactory> {
        self.select(name.parse()?)
    }

    /// Factory for the backend named in `config`.
    pub fn from_config(&self, config: &BackendConfig) -> Result<FileFactory> {
        self.select(config.backend)
    }

    /// Cache factory for the backend named in `config`.
    pub fn cache_from_config(&self, config: &BackendConfig) -> Result<CacheFileFactory> {
        self.select_cache(config.backend)
    }
}

/// Opens [`FileHandle`]s of one backend.
#[derive(Clone, Copy)]
pub struct FileFactory {
    id: BackendId,
    open: fn(&Path, OpenMode) -> Result<Box<dyn NodeStore>>,
}

impl FileFactory {
    pub fn backend(&self) -> BackendId {
        self.id
    }

    pub fn open_with<P: AsRef<Path>>(&self, path: P, mode: OpenMode) -> Result<FileHandle> {
        let store = (self.open)(path.as_ref(), mode)?;
        Ok(FileHandle::new(store, mode))
    }

    /// Creates a new container, truncating an existing one.
    pub fn create<P: AsRef<Path>>(&self, path: P) -> Result<FileHandle> {
        self.open_with(path, OpenMode::Create)
    }

    /// Opens an existing container read-only.
    pub fn open<P: AsRef<Path>>(&self, path: P) -> Result<FileHandle> {
        self.open_with(path, OpenMode::ReadOnly)
    }

    pub fn open_rw<P: AsRef<Path>>(&self, path: P) -> Result<FileHandle> {
        self.open_with(path, OpenMode::ReadWrite)
    }
}

/// Opens [`CacheFileHandle`]s of one backend.
#[derive(Clone, Copy)]
pub struct CacheFileFactory {
    id: BackendId,
    open: fn(&Path, OpenMode) -> Result<Box<dyn CacheStore>>,
}

impl CacheFileFactory {
    pub fn backend(&self) -> BackendId {
        self.id
    }

    pub fn open_with<P: AsRef<Path>>(&self, path: P, mode: OpenMode) -> Result<CacheFileHandle> {
        let store = (self.open)(path.as_ref(), mode)?;
        Ok(CacheFileHandle::new(store, mode))
    }

    pub fn create<P: AsRef<Path>>(&self, path: P) -> Result<CacheFileHandle> {
        self.open_with(path, OpenMode::Create)
    }

    pub fn open<P: AsRef<Path>>(&self, path: P) -> Result<CacheFileHandle> {
        self.open_with(path, OpenMode::ReadOnly)
    }

    pub fn open_rw<P: AsRef<Path>>(&self, path: P) -> Result<CacheFileHandle> {
        self.open_with(path, OpenMode::ReadWrite)
    }
}
