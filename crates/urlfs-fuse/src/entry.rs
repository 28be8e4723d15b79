//! Registry entries: one per registered remote resource.
//!
//! An entry is shared as an [`EntryHandle`] (`Arc<RwLock<FileEntry>>`). The
//! registry keeps one handle per live entry; readers clone it under the
//! registry lock, take the entry's read lock through [`RwLock::read_arc`],
//! and then let the registry lock go. Because the guard owns its own `Arc`,
//! the entry stays alive for as long as a reader holds it, even after the
//! registry has detached it.

use std::sync::Arc;

use parking_lot::{ArcRwLockReadGuard, RawRwLock, RwLock};

use crate::network::RemoteMetadata;

/// Stable identifier assigned when an entry is created. Never reused.
pub type EntryId = u64;

/// Mode bits reported for every link.
pub const LINK_MODE: u32 = libc::S_IFLNK | 0o444;

/// Mode bits reported for every fakefile.
pub const FAKEFILE_MODE: u32 = libc::S_IFREG | 0o444;

/// Metadata record of a registered remote resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub id: EntryId,
    /// Registry path, e.g. `/name`. Changed only by rename.
    pub path: String,
    /// URL the bytes are streamed from.
    pub source: String,
    /// Remote size in bytes, fetched once at creation.
    pub size: u64,
    pub mode: u32,
    /// Remote modification time, seconds since the epoch.
    pub mtime: i64,
}

impl FileEntry {
    pub fn new(id: EntryId, path: &str, source: &str, meta: RemoteMetadata) -> Self {
        Self {
            id,
            path: path.to_string(),
            source: source.to_string(),
            size: meta.size,
            mode: LINK_MODE,
            mtime: meta.modified_time,
        }
    }

    /// Bytes this record occupies, including its owned strings.
    pub fn record_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.path.len() + self.source.len()
    }

    /// Clamp a read of `length` bytes at `offset` to the entry's size.
    pub fn clamp_read(&self, offset: u64, length: u64) -> u64 {
        if offset >= self.size {
            return 0;
        }
        length.min(self.size - offset)
    }
}

pub type EntryHandle = Arc<RwLock<FileEntry>>;

/// Entry read lock that keeps the entry alive on its own.
pub type EntryReadGuard = ArcRwLockReadGuard<RawRwLock, FileEntry>;

pub fn new_handle(entry: FileEntry) -> EntryHandle {
    Arc::new(RwLock::new(entry))
}
