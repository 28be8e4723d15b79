//! Inode numbering.
//!
//! Inodes are derived from entry ids, so no inode table is kept:
//! root is 1, `.ff` is 2, and entry `n` owns `2n + 1` (its link) and
//! `2n + 2` (its fakefile). Ids start at 1, so the two ranges never collide
//! with the fixed directories.

use crate::entry::EntryId;

pub type InodeId = u64;

pub const ROOT_INODE: InodeId = 1;
pub const FAKEFILE_DIR_INODE: InodeId = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    Root,
    FakefileDir,
    Link(EntryId),
    Fakefile(EntryId),
}

impl InodeKind {
    pub fn classify(ino: InodeId) -> Option<Self> {
        match ino {
            0 => None,
            ROOT_INODE => Some(InodeKind::Root),
            FAKEFILE_DIR_INODE => Some(InodeKind::FakefileDir),
            n if n % 2 == 1 => Some(InodeKind::Link((n - 1) / 2)),
            n => Some(InodeKind::Fakefile((n - 2) / 2)),
        }
    }

    pub fn ino(self) -> InodeId {
        match self {
            InodeKind::Root => ROOT_INODE,
            InodeKind::FakefileDir => FAKEFILE_DIR_INODE,
            InodeKind::Link(id) => link_inode(id),
            InodeKind::Fakefile(id) => fakefile_inode(id),
        }
    }

    pub fn is_dir(self) -> bool {
        matches!(self, InodeKind::Root | InodeKind::FakefileDir)
    }
}

pub fn link_inode(id: EntryId) -> InodeId {
    2 * id + 1
}

pub fn fakefile_inode(id: EntryId) -> InodeId {
    2 * id + 2
}
