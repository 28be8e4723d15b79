//! Core FUSE filesystem implementation.
//!
//! Implements the `fuser::Filesystem` trait on top of the shared [`Registry`].
//! The root directory holds one symlink per entry, and `.ff` holds the
//! matching fakefiles. Callbacks that can reach the network (`read`,
//! `symlink`) or wait on an entry lock (`unlink`, `rename`) run on the tokio
//! blocking pool so the session thread keeps serving other requests; the rest
//! answer inline.

use std::ffi::OsStr;
use std::os::raw::c_int;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, Request,
};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::attr::{fuser_type, AttrContext};
use crate::error::{FuseError, RegistryError, Result};
use crate::fakefile::{self, Route, FAKEFILE_DIR};
use crate::inode::{InodeId, InodeKind, ROOT_INODE};
use crate::registry::Registry;

/// One `readdir` row: inode, type, name.
pub type DirRow = (InodeId, FileType, String);

#[derive(Clone)]
pub struct UrlFilesystem {
    registry: Arc<Registry>,
    attrs: AttrContext,
    ttl: Duration,
    runtime: Handle,
}

impl UrlFilesystem {
    pub fn new(registry: Arc<Registry>, attrs: AttrContext, ttl: Duration, runtime: Handle) -> Self {
        Self {
            registry,
            attrs,
            ttl,
            runtime,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    fn classify(ino: InodeId) -> Result<InodeKind> {
        InodeKind::classify(ino).ok_or(FuseError::NotFound { ino })
    }

    /// Route `name` inside the directory `parent`.
    fn child_route(parent: InodeId, name: &str) -> Result<Route> {
        let full = match Self::classify(parent)? {
            InodeKind::Root => format!("/{}", name),
            InodeKind::FakefileDir => format!("/{}/{}", FAKEFILE_DIR, name),
            _ => return Err(FuseError::NotDirectory { ino: parent }),
        };
        fakefile::route(&full).ok_or_else(|| FuseError::InvalidArgument {
            msg: format!("invalid name: {}", name),
        })
    }

    pub fn attr_for_route(&self, route: &Route) -> Result<FileAttr> {
        match route {
            Route::Root => Ok(self.attrs.directory(InodeKind::Root)),
            Route::FakefileDir => Ok(self.attrs.directory(InodeKind::FakefileDir)),
            Route::Link(path) => {
                let entry = self.registry.lookup_by_path(path)?;
                Ok(self.attrs.link(&entry))
            }
            Route::Fakefile(path) => {
                let entry = self.registry.lookup_by_path(path)?;
                Ok(self.attrs.fakefile(&entry))
            }
        }
    }

    pub fn do_lookup(&self, parent: InodeId, name: &str) -> Result<FileAttr> {
        let route = Self::child_route(parent, name)?;
        self.attr_for_route(&route)
    }

    pub fn do_getattr(&self, ino: InodeId) -> Result<FileAttr> {
        match Self::classify(ino)? {
            kind @ (InodeKind::Root | InodeKind::FakefileDir) => Ok(self.attrs.directory(kind)),
            InodeKind::Link(id) => {
                let entry = self.registry.lookup_by_id(id)?;
                Ok(self.attrs.link(&entry))
            }
            InodeKind::Fakefile(id) => {
                let entry = self.registry.lookup_by_id(id)?;
                Ok(self.attrs.fakefile(&entry))
            }
        }
    }

    pub fn do_readlink(&self, ino: InodeId) -> Result<String> {
        match Self::classify(ino)? {
            InodeKind::Link(id) => {
                let entry = self.registry.lookup_by_id(id)?;
                Ok(fakefile::link_target(&entry.path))
            }
            _ => Err(FuseError::InvalidArgument {
                msg: format!("inode {} is not a symlink", ino),
            }),
        }
    }

    pub fn do_unlink(&self, parent: InodeId, name: &str) -> Result<()> {
        match Self::child_route(parent, name)? {
            Route::Link(path) => Ok(self.registry.remove(&path)?),
            Route::Fakefile(_) => Err(FuseError::NotPermitted {
                op: format!("unlink {}/{}", FAKEFILE_DIR, name),
            }),
            Route::Root | Route::FakefileDir => Err(FuseError::IsDirectory { ino: parent }),
        }
    }

    /// Register `target` as a new link `name` in the root directory.
    ///
    /// Blocks on the network while the source is checked.
    pub fn do_symlink(&self, parent: InodeId, name: &str, target: &Path) -> Result<FileAttr> {
        match Self::classify(parent)? {
            InodeKind::Root => {}
            InodeKind::FakefileDir => {
                return Err(FuseError::NotPermitted {
                    op: format!("symlink in {}", FAKEFILE_DIR),
                })
            }
            _ => return Err(FuseError::NotDirectory { ino: parent }),
        }
        fakefile::validate_link_name(name)?;
        let source = target.to_str().ok_or_else(|| FuseError::InvalidArgument {
            msg: "link source is not valid UTF-8".to_string(),
        })?;
        fakefile::validate_source(source)?;

        let path = fakefile::registry_path(name);
        let id = self.registry.create(&path, source)?;
        let entry = self.registry.lookup_by_id(id)?;
        Ok(self.attrs.link(&entry))
    }

    pub fn do_rename(
        &self,
        parent: InodeId,
        name: &str,
        newparent: InodeId,
        newname: &str,
        flags: u32,
    ) -> Result<()> {
        if parent != ROOT_INODE || newparent != ROOT_INODE {
            return Err(FuseError::CrossDevice {
                op: format!("rename {} -> {} across directories", name, newname),
            });
        }
        if flags & libc::RENAME_EXCHANGE != 0 {
            return Err(FuseError::InvalidArgument {
                msg: "RENAME_EXCHANGE is not supported".to_string(),
            });
        }
        if name == FAKEFILE_DIR {
            return Err(FuseError::NotPermitted {
                op: format!("rename {}", FAKEFILE_DIR),
            });
        }
        fakefile::validate_link_name(newname)?;
        self.registry.rename(
            &fakefile::registry_path(name),
            &fakefile::registry_path(newname),
        )?;
        Ok(())
    }

    /// Validate an open; only read-only opens of fakefiles are allowed.
    pub fn do_open(&self, ino: InodeId, flags: i32) -> Result<()> {
        match Self::classify(ino)? {
            InodeKind::Fakefile(id) => {
                if flags & libc::O_ACCMODE != libc::O_RDONLY {
                    return Err(FuseError::PermissionDenied {
                        ino,
                        op: "open for writing".to_string(),
                    });
                }
                self.registry.lookup_by_id(id)?;
                Ok(())
            }
            InodeKind::Root | InodeKind::FakefileDir => Err(FuseError::IsDirectory { ino }),
            InodeKind::Link(_) => Err(FuseError::InvalidArgument {
                msg: format!("inode {} is a symlink", ino),
            }),
        }
    }

    /// Stream up to `size` bytes of a fakefile from its source.
    pub fn do_read(&self, ino: InodeId, offset: i64, size: u32) -> Result<Vec<u8>> {
        let offset = u64::try_from(offset).map_err(|_| FuseError::InvalidArgument {
            msg: format!("negative read offset {}", offset),
        })?;
        match Self::classify(ino)? {
            InodeKind::Fakefile(id) => Ok(self.registry.read_bytes_by_id(id, offset, size.into())?),
            InodeKind::Root | InodeKind::FakefileDir => Err(FuseError::IsDirectory { ino }),
            InodeKind::Link(_) => Err(FuseError::InvalidArgument {
                msg: format!("inode {} is a symlink", ino),
            }),
        }
    }

    /// Every row of the directory `ino`, including `.` and `..`.
    pub fn dir_rows(&self, ino: InodeId) -> Result<Vec<DirRow>> {
        let kind = Self::classify(ino)?;
        let mut rows: Vec<DirRow> = vec![
            (ino, FileType::Directory, ".".to_string()),
            (ROOT_INODE, FileType::Directory, "..".to_string()),
        ];
        let child: fn(u64) -> InodeKind = match kind {
            InodeKind::Root => {
                rows.push((
                    InodeKind::FakefileDir.ino(),
                    FileType::Directory,
                    FAKEFILE_DIR.to_string(),
                ));
                InodeKind::Link
            }
            InodeKind::FakefileDir => InodeKind::Fakefile,
            _ => return Err(FuseError::NotDirectory { ino }),
        };
        rows.extend(self.registry.snapshot().into_iter().map(|(id, path)| {
            let kind = child(id);
            (kind.ino(), fuser_type(kind), fakefile::entry_name(&path).to_string())
        }));
        Ok(rows)
    }
}

fn errno_of(op: &str, err: &FuseError) -> c_int {
    match err {
        FuseError::Registry(RegistryError::Unreachable { .. }) => warn!("{} failed: {}", op, err),
        _ => debug!("{} failed: {}", op, err),
    }
    err.to_errno()
}

impl Filesystem for UrlFilesystem {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> std::result::Result<(), c_int> {
        info!(
            "urlfs filesystem init: {} entries, capacity {}",
            self.registry.len(),
            self.registry.capacity()
        );
        Ok(())
    }

    fn destroy(&mut self) {
        info!("urlfs filesystem destroyed");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let name_str = name.to_string_lossy();
        debug!("lookup parent={} name={}", parent, name_str);

        match self.do_lookup(parent, &name_str) {
            Ok(attr) => reply.entry(&self.ttl, &attr, 0),
            Err(e) => reply.error(errno_of("lookup", &e)),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        debug!("getattr ino={}", ino);
        match self.do_getattr(ino) {
            Ok(attr) => reply.attr(&self.ttl, &attr),
            Err(e) => reply.error(errno_of("getattr", &e)),
        }
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        debug!("readlink ino={}", ino);
        match self.do_readlink(ino) {
            Ok(target) => reply.data(target.as_bytes()),
            Err(e) => reply.error(errno_of("readlink", &e)),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name_str = name.to_string_lossy();
        debug!("unlink parent={} name={}", parent, name_str);

        // Removal can wait on in-flight reads of the same entry.
        let fs = self.clone();
        let name = name_str.into_owned();
        self.runtime.spawn_blocking(move || match fs.do_unlink(parent, &name) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno_of("unlink", &e)),
        });
    }

    fn symlink(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        let name = link_name.to_string_lossy().into_owned();
        debug!("symlink parent={} name={} target={}", parent, name, target.display());

        let fs = self.clone();
        let target = target.to_path_buf();
        self.runtime.spawn_blocking(move || match fs.do_symlink(parent, &name, &target) {
            Ok(attr) => reply.entry(&fs.ttl, &attr, 0),
            Err(e) => reply.error(errno_of("symlink", &e)),
        });
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        let name_str = name.to_string_lossy();
        let newname_str = newname.to_string_lossy();
        debug!(
            "rename parent={} name={} newparent={} newname={}",
            parent, name_str, newparent, newname_str
        );

        // Rename waits for the entry write lock, so it must not stall the session.
        let fs = self.clone();
        let (name, newname) = (name_str.into_owned(), newname_str.into_owned());
        self.runtime.spawn_blocking(move || {
            match fs.do_rename(parent, &name, newparent, &newname, flags) {
                Ok(()) => reply.ok(),
                Err(e) => reply.error(errno_of("rename", &e)),
            }
        });
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        debug!("open ino={} flags={}", ino, flags);
        match self.do_open(ino, flags) {
            Ok(()) => reply.opened(0, fuser::consts::FOPEN_DIRECT_IO),
            Err(e) => reply.error(errno_of("open", &e)),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        debug!("read ino={} offset={} size={}", ino, offset, size);

        let fs = self.clone();
        self.runtime.spawn_blocking(move || match fs.do_read(ino, offset, size) {
            Ok(bytes) => reply.data(&bytes),
            Err(e) => reply.error(errno_of("read", &e)),
        });
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        debug!("opendir ino={}", ino);
        match InodeKind::classify(ino) {
            Some(kind) if kind.is_dir() => reply.opened(0, 0),
            Some(_) => reply.error(libc::ENOTDIR),
            None => reply.error(libc::ENOENT),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        debug!("readdir ino={} offset={}", ino, offset);

        let rows = match self.dir_rows(ino) {
            Ok(rows) => rows,
            Err(e) => {
                reply.error(errno_of("readdir", &e));
                return;
            }
        };

        let skip = usize::try_from(offset).unwrap_or(0);
        for (i, (child_ino, kind, name)) in rows.into_iter().enumerate().skip(skip) {
            if reply.add(child_ino, (i + 1) as i64, kind, &name) {
                break;
            }
        }
        reply.ok();
    }
}
