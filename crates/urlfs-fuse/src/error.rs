use thiserror::Error;
use urlfs_store::SlotError;

/// Failures reported by a network backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("No backend registered for scheme of {url}")]
    UnsupportedScheme { url: String },

    #[error("Source unreachable: {url}: {reason}")]
    Unreachable { url: String, reason: String },
}

impl NetworkError {
    pub fn unreachable(url: &str, reason: impl Into<String>) -> Self {
        NetworkError::Unreachable {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failures reported by the path registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Invalid argument: {msg}")]
    InvalidArgument { msg: String },

    #[error("No entry at path: {path}")]
    NotFound { path: String },

    #[error("Path already exists: {path}")]
    AlreadyExists { path: String },

    #[error("Registry at capacity ({capacity} entries)")]
    ResourceExhausted { capacity: usize },

    #[error("Source unreachable: {url}: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("Out of memory: {msg}")]
    OutOfMemory { msg: String },
}

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

impl From<SlotError> for RegistryError {
    fn from(e: SlotError) -> Self {
        match e {
            SlotError::Full { capacity } => RegistryError::ResourceExhausted { capacity },
            SlotError::OutOfMemory { requested } => RegistryError::OutOfMemory {
                msg: format!("cannot reserve {} registry slots", requested),
            },
            SlotError::InvalidArgument { msg } => RegistryError::InvalidArgument { msg },
        }
    }
}

impl From<NetworkError> for RegistryError {
    fn from(e: NetworkError) -> Self {
        match e {
            NetworkError::UnsupportedScheme { url } => RegistryError::Unreachable {
                url,
                reason: "unsupported scheme".to_string(),
            },
            NetworkError::Unreachable { url, reason } => RegistryError::Unreachable { url, reason },
        }
    }
}

#[derive(Debug, Error)]
pub enum FuseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Mount failed at {mountpoint}: {reason}")]
    MountFailed { mountpoint: String, reason: String },

    #[error("Invalid configuration: {msg}")]
    Config { msg: String },

    #[error("Inode not found: {ino}")]
    NotFound { ino: u64 },

    #[error("Permission denied for inode {ino}, operation: {op}")]
    PermissionDenied { ino: u64, op: String },

    #[error("Operation not permitted: {op}")]
    NotPermitted { op: String },

    #[error("Not a directory: {ino}")]
    NotDirectory { ino: u64 },

    #[error("Is a directory: {ino}")]
    IsDirectory { ino: u64 },

    #[error("Invalid argument: {msg}")]
    InvalidArgument { msg: String },

    #[error("Cross-namespace operation: {op}")]
    CrossDevice { op: String },
}

pub type Result<T> = std::result::Result<T, FuseError>;

impl RegistryError {
    pub fn to_errno(&self) -> i32 {
        use libc::*;
        match self {
            RegistryError::InvalidArgument { .. } => EINVAL,
            RegistryError::NotFound { .. } => ENOENT,
            RegistryError::AlreadyExists { .. } => EEXIST,
            RegistryError::ResourceExhausted { .. } => ENOSPC,
            RegistryError::Unreachable { .. } => EHOSTUNREACH,
            RegistryError::OutOfMemory { .. } => ENOMEM,
        }
    }
}

impl FuseError {
    pub fn to_errno(&self) -> i32 {
        use libc::*;
        match self {
            FuseError::Io(e) => e.raw_os_error().unwrap_or(EIO),
            FuseError::Registry(e) => e.to_errno(),
            FuseError::MountFailed { .. } => ENOENT,
            FuseError::Config { .. } => EINVAL,
            FuseError::NotFound { .. } => ENOENT,
            FuseError::PermissionDenied { .. } => EACCES,
            FuseError::NotPermitted { .. } => EPERM,
            FuseError::NotDirectory { .. } => ENOTDIR,
            FuseError::IsDirectory { .. } => EISDIR,
            FuseError::InvalidArgument { .. } => EINVAL,
            FuseError::CrossDevice { .. } => EXDEV,
        }
    }
}
