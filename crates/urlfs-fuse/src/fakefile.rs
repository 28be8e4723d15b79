//! The fakefile namespace.
//!
//! Every registered link `/name` has a twin `/.ff/name`: a read-only regular
//! file whose bytes are streamed from the link's source. `readlink(/name)`
//! points at the twin, so following the link reads remote content.

use crate::error::{FuseError, Result};

/// Directory holding the fakefiles, directly under the mount root.
pub const FAKEFILE_DIR: &str = ".ff";

const MAX_TARGET_LEN: usize = 4096;

/// Where a mount-relative path lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Root,
    FakefileDir,
    /// A link, carrying its registry path.
    Link(String),
    /// A fakefile, carrying the registry path of the entry behind it.
    Fakefile(String),
}

/// Route an absolute mount-relative path such as `/.ff/name`.
///
/// Nested paths below a link or below `.ff/name` do not exist.
pub fn route(path: &str) -> Option<Route> {
    let rest = path.strip_prefix('/')?;
    if rest.is_empty() {
        return Some(Route::Root);
    }
    match rest.split_once('/') {
        None if rest == FAKEFILE_DIR => Some(Route::FakefileDir),
        None => Some(Route::Link(registry_path(rest))),
        Some((dir, "")) if dir == FAKEFILE_DIR => Some(Route::FakefileDir),
        Some((dir, name)) if dir == FAKEFILE_DIR && !name.is_empty() && !name.contains('/') => {
            Some(Route::Fakefile(registry_path(name)))
        }
        Some(_) => None,
    }
}

/// Registry path of the root-level name `name`.
pub fn registry_path(name: &str) -> String {
    format!("/{}", name)
}

/// Directory entry name of a registry path.
pub fn entry_name(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

/// What `readlink` returns for the link at `path`.
pub fn link_target(path: &str) -> String {
    format!("{}/{}", FAKEFILE_DIR, entry_name(path))
}

/// Check a name about to be created or renamed into the root directory.
pub fn validate_link_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(FuseError::InvalidArgument {
            msg: format!("invalid link name: {:?}", name),
        });
    }
    if name.contains('/') {
        return Err(FuseError::InvalidArgument {
            msg: format!("link name cannot contain '/': {}", name),
        });
    }
    if name == FAKEFILE_DIR {
        return Err(FuseError::InvalidArgument {
            msg: format!("{} is reserved", FAKEFILE_DIR),
        });
    }
    Ok(())
}

/// Check the URL given as a new link's target.
pub fn validate_source(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(FuseError::InvalidArgument {
            msg: "link source cannot be empty".to_string(),
        });
    }
    if url.len() > MAX_TARGET_LEN {
        return Err(FuseError::InvalidArgument {
            msg: format!("link source exceeds maximum length of {}", MAX_TARGET_LEN),
        });
    }
    Ok(())
}
