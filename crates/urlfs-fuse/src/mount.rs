//! Mount point management for the urlfs daemon.
//!
//! Handles the `[mount]` configuration section, `-o` option parsing and
//! mountpoint validation. The mount is writable by default so that `ln -s`,
//! `rm` and `mv` reach the daemon; file contents are read-only regardless.
//! The fsname is always `urlfs`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mount options for FUSE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountOptions {
    /// Allow other users to access.
    pub allow_other: bool,
    /// Allow root to access.
    pub allow_root: bool,
    /// Let the kernel check permissions from the reported mode bits.
    pub default_permissions: bool,
    /// Unmount when the daemon exits.
    pub auto_unmount: bool,
    /// Allow a non-empty mountpoint.
    pub nonempty: bool,
    /// Mount read-only; link creation, removal and rename then fail with EROFS.
    pub read_only: bool,
    /// Attribute and entry cache lifetime handed to the kernel, in seconds.
    pub attr_ttl_secs: u64,
}

impl Default for MountOptions {
    fn default() -> Self {
        MountOptions {
            allow_other: false,
            allow_root: false,
            default_permissions: false,
            auto_unmount: false,
            nonempty: false,
            read_only: false,
            attr_ttl_secs: 1,
        }
    }
}

impl MountOptions {
    pub fn attr_ttl(&self) -> Duration {
        Duration::from_secs(self.attr_ttl_secs)
    }
}

/// Errors that can occur during mount operations.
#[derive(Debug, Error)]
pub enum MountError {
    /// Path does not exist.
    #[error("Path not found: {0}")]
    PathNotFound(String),

    /// Path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// Invalid option.
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("Conflicting options: {0}")]
    Conflict(String),
}

/// Validate a mountpoint path.
pub fn validate_mountpoint(path: &Path) -> Result<(), MountError> {
    if !path.exists() {
        return Err(MountError::PathNotFound(path.display().to_string()));
    }

    if !path.is_dir() {
        return Err(MountError::NotADirectory(path.display().to_string()));
    }

    Ok(())
}

/// Apply comma-separated `-o` options on top of `base`.
///
/// Valid options: allow_other, allow_root, default_permissions, auto_unmount,
/// noauto_unmount, nonempty, ro, rw, attr_ttl=SECS.
pub fn parse_mount_options(base: &MountOptions, opts_str: &str) -> Result<MountOptions, MountError> {
    let mut options = base.clone();

    for opt in opts_str.split(',') {
        let opt = opt.trim();
        match opt {
            "allow_other" => options.allow_other = true,
            "allow_root" => options.allow_root = true,
            "default_permissions" => options.default_permissions = true,
            "auto_unmount" => options.auto_unmount = true,
            "noauto_unmount" => options.auto_unmount = false,
            "nonempty" => options.nonempty = true,
            "ro" => options.read_only = true,
            "rw" => options.read_only = false,
            "" => {}
            _ => match opt.strip_prefix("attr_ttl=") {
                Some(secs) => {
                    options.attr_ttl_secs = secs
                        .parse()
                        .map_err(|_| MountError::InvalidOption(opt.to_string()))?;
                }
                None => return Err(MountError::InvalidOption(opt.to_string())),
            },
        }
    }

    if options.allow_other && options.allow_root {
        return Err(MountError::Conflict(
            "allow_other and allow_root are mutually exclusive".to_string(),
        ));
    }

    Ok(options)
}

/// Convert MountOptions to fuser::MountOption vec.
pub fn options_to_fuser(opts: &MountOptions) -> Vec<fuser::MountOption> {
    let mut fuser_opts = vec![
        fuser::MountOption::FSName("urlfs".to_string()),
        fuser::MountOption::Subtype("urlfs".to_string()),
    ];

    if opts.read_only {
        fuser_opts.push(fuser::MountOption::RO);
    }

    if opts.allow_other {
        fuser_opts.push(fuser::MountOption::AllowOther);
    }

    if opts.allow_root {
        fuser_opts.push(fuser::MountOption::AllowRoot);
    }

    if opts.default_permissions {
        fuser_opts.push(fuser::MountOption::DefaultPermissions);
    }

    if opts.auto_unmount {
        fuser_opts.push(fuser::MountOption::AutoUnmount);
    }

    if opts.nonempty {
        fuser_opts.push(fuser::MountOption::CUSTOM("nonempty".into()));
    }

    fuser_opts
}
