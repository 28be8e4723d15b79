//! Attribute building for the fuser adapter.

use std::time::{Duration, SystemTime};

use fuser::{FileAttr, FileType};

use crate::entry::FileEntry;
use crate::fakefile::link_target;
use crate::inode::{fakefile_inode, link_inode, InodeKind};

const BLOCK_SIZE: u32 = 4096;

/// Ownership and directory timestamps shared by every reported inode.
#[derive(Debug, Clone, Copy)]
pub struct AttrContext {
    pub uid: u32,
    pub gid: u32,
    /// Timestamp reported for the root and `.ff` directories.
    pub mounted_at: SystemTime,
}

impl AttrContext {
    pub fn new(uid: u32, gid: u32) -> Self {
        Self {
            uid,
            gid,
            mounted_at: SystemTime::now(),
        }
    }

    /// The calling process's uid and gid.
    pub fn current() -> Self {
        // SAFETY: getuid/getgid cannot fail and touch no memory.
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        Self::new(uid, gid)
    }

    fn base(&self, ino: u64, kind: FileType, perm: u16, size: u64, time: SystemTime) -> FileAttr {
        FileAttr {
            ino,
            size,
            blocks: blocks_for_size(size),
            atime: time,
            mtime: time,
            ctime: time,
            crtime: SystemTime::UNIX_EPOCH,
            kind,
            perm,
            nlink: if kind == FileType::Directory { 2 } else { 1 },
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }

    pub fn directory(&self, kind: InodeKind) -> FileAttr {
        self.base(kind.ino(), FileType::Directory, 0o555, 0, self.mounted_at)
    }

    /// The link `/name`: size is the length of its `readlink` target.
    pub fn link(&self, entry: &FileEntry) -> FileAttr {
        let size = link_target(&entry.path).len() as u64;
        self.base(
            link_inode(entry.id),
            FileType::Symlink,
            perm_bits(entry.mode),
            size,
            epoch_time(entry.mtime),
        )
    }

    /// The fakefile `/.ff/name`: size is the remote size.
    pub fn fakefile(&self, entry: &FileEntry) -> FileAttr {
        self.base(
            fakefile_inode(entry.id),
            FileType::RegularFile,
            perm_bits(entry.mode),
            entry.size,
            epoch_time(entry.mtime),
        )
    }
}

pub fn blocks_for_size(size: u64) -> u64 {
    size.div_ceil(512)
}

fn perm_bits(mode: u32) -> u16 {
    (mode & 0o7777) as u16
}

fn epoch_time(secs: i64) -> SystemTime {
    if secs >= 0 {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        SystemTime::UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}

/// fuser type of the inode, for readdir.
pub fn fuser_type(kind: InodeKind) -> FileType {
    match kind {
        InodeKind::Root | InodeKind::FakefileDir => FileType::Directory,
        InodeKind::Link(_) => FileType::Symlink,
        InodeKind::Fakefile(_) => FileType::RegularFile,
    }
}
