#![warn(missing_docs)]

//! urlfs FUSE subsystem.
//!
//! Remote resources are registered as symlinks in the mount root. Each link
//! points into the `.ff` directory, where a read-only regular file of the
//! same name streams the resource's bytes from its source on demand.

pub mod attr;
pub mod cli;
pub mod config;
pub mod entry;
pub mod error;
pub mod fakefile;
pub mod file_backend;
pub mod filesystem;
pub mod http_backend;
pub mod inode;
pub mod mount;
pub mod network;
pub mod registry;
pub mod server;

pub use error::{FuseError, RegistryError, Result};
pub use filesystem::UrlFilesystem;
pub use registry::{Registry, RegistryConfig};
