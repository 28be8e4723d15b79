//! Concurrent path registry.
//!
//! The registry owns every live [`FileEntry`] in a fixed-capacity
//! [`SlotStore`] behind a single reader-writer lock, and each entry carries its
//! own reader-writer lock. The two locks are always taken in the same order:
//!
//! 1. the registry lock, then
//! 2. the entry lock.
//!
//! Read-only entry access (attributes, reads) takes the entry read lock while
//! the registry read lock is still held, then drops the registry lock, so a
//! slow network read only serializes against writers of that one entry.
//! Renames hold the registry write lock *and* the entry write lock for the
//! whole path update, so no lookup can observe a half-written path. Removal
//! detaches the entry under the registry write lock, drops that lock, and
//! then takes the entry write lock, which waits out readers already in flight.
//!
//! Network I/O never happens with the registry lock held: `create` fetches
//! metadata before locking and re-checks path uniqueness afterwards.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use urlfs_store::{CompactionPolicy, SlotBox, SlotStore};

use crate::entry::{new_handle, EntryHandle, EntryId, EntryReadGuard, FileEntry};
use crate::error::{RegistryError, RegistryResult};
use crate::network::Backend;

/// Registry sizing and layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Maximum number of live entries
    pub capacity: usize,
    /// How the entry table is re-densified after a removal
    pub compaction: CompactionPolicy,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            compaction: CompactionPolicy::Shift,
        }
    }
}

pub struct Registry {
    entries: RwLock<SlotStore<EntryHandle>>,
    backend: Arc<dyn Backend>,
    next_id: AtomicU64,
}

fn validate_path(path: &str) -> RegistryResult<()> {
    if path.is_empty() {
        return Err(RegistryError::InvalidArgument {
            msg: "path cannot be empty".to_string(),
        });
    }
    if !path.starts_with('/') {
        return Err(RegistryError::InvalidArgument {
            msg: format!("path must be absolute: {}", path),
        });
    }
    Ok(())
}

fn not_found(path: &str) -> RegistryError {
    RegistryError::NotFound {
        path: path.to_string(),
    }
}

fn id_not_found(id: EntryId) -> RegistryError {
    RegistryError::NotFound {
        path: format!("<entry {}>", id),
    }
}

impl Registry {
    pub fn new(config: &RegistryConfig, backend: Arc<dyn Backend>) -> RegistryResult<Self> {
        let store = SlotStore::with_policy(config.capacity, config.compaction)?;
        info!(
            "Path registry ready: capacity={} compaction={:?}",
            config.capacity, config.compaction
        );
        Ok(Self {
            entries: RwLock::new(store),
            backend,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn capacity(&self) -> usize {
        self.entries.read().capacity()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    // Caller holds the registry lock; entry paths only change under the
    // registry write lock, so the short entry read here never waits on a rename.
    fn position_of_path(store: &SlotStore<EntryHandle>, path: &str) -> Option<usize> {
        store.position_where(|handle| handle.read().path == path)
    }

    /// Find an entry and return it read-locked.
    ///
    /// The entry lock is acquired before the registry read lock is released.
    fn read_locked<F>(&self, pred: F) -> Option<EntryReadGuard>
    where
        F: Fn(&FileEntry) -> bool,
    {
        let store = self.entries.read();
        let guard = store.iter().find_map(|slot| {
            let guard = slot.value().read_arc();
            pred(&*guard).then_some(guard)
        });
        drop(store);
        guard
    }

    /// Resolve `path` to its entry, read-locked.
    ///
    /// The returned guard keeps the entry alive and its path stable until it
    /// is dropped, even if the entry is concurrently removed from the registry.
    pub fn lookup_by_path(&self, path: &str) -> RegistryResult<EntryReadGuard> {
        self.read_locked(|e| e.path == path)
            .ok_or_else(|| not_found(path))
    }

    /// Resolve an entry id to its entry, read-locked.
    pub fn lookup_by_id(&self, id: EntryId) -> RegistryResult<EntryReadGuard> {
        self.read_locked(|e| e.id == id)
            .ok_or_else(|| id_not_found(id))
    }

    /// Register `source` under `path`.
    ///
    /// The source is validated and its metadata fetched before any lock is
    /// taken; uniqueness is checked again under the registry write lock, since
    /// another thread may have claimed the path in the meantime. Reachability
    /// is not re-validated once the lock is held.
    pub fn create(&self, path: &str, source: &str) -> RegistryResult<EntryId> {
        validate_path(path)?;
        if source.is_empty() {
            return Err(RegistryError::InvalidArgument {
                msg: "source URL cannot be empty".to_string(),
            });
        }

        if !self.backend.is_reachable(source) {
            warn!("Source failed reachability check: {}", source);
            return Err(RegistryError::Unreachable {
                url: source.to_string(),
                reason: "reachability check failed".to_string(),
            });
        }
        let meta = self.backend.fetch_metadata(source)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = FileEntry::new(id, path, source, meta);
        let record_size = entry.record_size();
        let object = SlotBox::allocate_sized(new_handle(entry), record_size)?;

        let mut store = self.entries.write();
        if Self::position_of_path(&store, path).is_some() {
            drop(store);
            debug!("create lost race for {}", path);
            return Err(RegistryError::AlreadyExists {
                path: path.to_string(),
            });
        }
        store
            .link_external(object)
            .map_err(|rejected| RegistryError::from(rejected.error))?;
        drop(store);

        info!(
            "Registered {} -> {} (id={} size={})",
            path, source, id, meta.size
        );
        Ok(id)
    }

    /// Remove the entry at `path`.
    ///
    /// Blocks until readers that already hold the entry have finished.
    pub fn remove(&self, path: &str) -> RegistryResult<()> {
        let handle = {
            let mut store = self.entries.write();
            let position = Self::position_of_path(&store, path).ok_or_else(|| not_found(path))?;
            store.unlink_at(position)?.release()
        };

        let entry = handle.write();
        info!("Removed {} (id={} source={})", entry.path, entry.id, entry.source);
        drop(entry);
        Ok(())
    }

    /// Rename `old_path` to `new_path` in place.
    pub fn rename(&self, old_path: &str, new_path: &str) -> RegistryResult<()> {
        validate_path(new_path)?;

        let store = self.entries.write();
        if Self::position_of_path(&store, new_path).is_some() {
            return Err(RegistryError::AlreadyExists {
                path: new_path.to_string(),
            });
        }
        let slot = Self::position_of_path(&store, old_path)
            .and_then(|position| store.get(position))
            .ok_or_else(|| not_found(old_path))?;

        // Registry write lock stays held until the path is fully replaced.
        let mut entry = slot.value().write();
        entry.path = new_path.to_string();
        let id = entry.id;
        drop(entry);
        drop(store);

        info!("Renamed {} -> {} (id={})", old_path, new_path, id);
        Ok(())
    }

    /// Read up to `length` bytes at `offset` from the entry at `path`.
    ///
    /// Reads past the end are clamped; a read starting at or after the end
    /// returns no bytes.
    pub fn read_bytes(&self, path: &str, offset: u64, length: u64) -> RegistryResult<Vec<u8>> {
        let entry = self.lookup_by_path(path)?;
        self.read_entry(&entry, offset, length)
    }

    /// Same as [`Registry::read_bytes`], locating the entry by id.
    pub fn read_bytes_by_id(&self, id: EntryId, offset: u64, length: u64) -> RegistryResult<Vec<u8>> {
        let entry = self.lookup_by_id(id)?;
        self.read_entry(&entry, offset, length)
    }

    // Only the entry read lock is held here.
    fn read_entry(&self, entry: &FileEntry, offset: u64, length: u64) -> RegistryResult<Vec<u8>> {
        let wanted = entry.clamp_read(offset, length);
        if wanted == 0 {
            return Ok(Vec::new());
        }
        let wanted = usize::try_from(wanted).map_err(|_| RegistryError::InvalidArgument {
            msg: format!("read length {} too large", wanted),
        })?;

        let mut buf = Vec::new();
        buf.try_reserve_exact(wanted)
            .map_err(|_| RegistryError::OutOfMemory {
                msg: format!("cannot allocate {} byte read buffer", wanted),
            })?;
        buf.resize(wanted, 0);

        let delivered = self.backend.fetch_range(&entry.source, offset, &mut buf)?;
        buf.truncate(delivered);
        debug!(
            "read path={} offset={} requested={} delivered={}",
            entry.path, offset, length, delivered
        );
        Ok(buf)
    }

    /// Snapshot of the entry at `path`.
    pub fn attributes(&self, path: &str) -> RegistryResult<FileEntry> {
        self.lookup_by_path(path).map(|entry| FileEntry::clone(&entry))
    }

    /// Snapshot of the entry with `id`.
    pub fn attributes_by_id(&self, id: EntryId) -> RegistryResult<FileEntry> {
        self.lookup_by_id(id).map(|entry| FileEntry::clone(&entry))
    }

    /// All current paths, in slot order.
    pub fn list_paths(&self) -> Vec<String> {
        let store = self.entries.read();
        store.iter().map(|slot| slot.value().read().path.clone()).collect()
    }

    /// All current `(id, path)` pairs, in slot order.
    pub fn snapshot(&self) -> Vec<(EntryId, String)> {
        let store = self.entries.read();
        store
            .iter()
            .map(|slot| {
                let entry = slot.value().read();
                (entry.id, entry.path.clone())
            })
            .collect()
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        let store = self.entries.get_mut();
        debug!("Releasing registry with {} entries", store.len());
        store.clear();
    }
}
