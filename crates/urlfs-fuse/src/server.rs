//! FUSE daemon server management.
//!
//! Owns the registry, registers the configured links, and runs the fuser
//! session until the filesystem is unmounted.

use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::attr::AttrContext;
use crate::config::UrlfsConfig;
use crate::error::{FuseError, Result};
use crate::filesystem::UrlFilesystem;
use crate::mount::{options_to_fuser, parse_mount_options, validate_mountpoint, MountOptions};
use crate::network::Backend;
use crate::registry::Registry;

/// Server state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerState {
    /// Server is stopped.
    #[default]
    Stopped,
    /// Links are being registered and the mount is being set up.
    Starting,
    /// The fuser session is running.
    Running,
    /// The session failed.
    Error,
}

pub struct UrlfsServer {
    config: UrlfsConfig,
    registry: Arc<Registry>,
    runtime: Handle,
    state: AtomicU8,
}

impl UrlfsServer {
    pub fn new(config: UrlfsConfig, backend: Arc<dyn Backend>, runtime: Handle) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(Registry::new(&config.registry, backend)?);
        Ok(Self {
            config,
            registry,
            runtime,
            state: AtomicU8::new(ServerState::Stopped as u8),
        })
    }

    pub fn config(&self) -> &UrlfsConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn state(&self) -> ServerState {
        match self.state.load(Ordering::SeqCst) {
            1 => ServerState::Starting,
            2 => ServerState::Running,
            3 => ServerState::Error,
            _ => ServerState::Stopped,
        }
    }

    fn set_state(&self, new_state: ServerState) {
        self.state.store(new_state as u8, Ordering::SeqCst);
    }

    /// Register every `[[links]]` entry; returns how many succeeded.
    ///
    /// A link that fails is logged and skipped. Blocks on the network, so it
    /// must not run inside an async task.
    pub fn preload_links(&self) -> usize {
        let mut registered = 0;
        for link in &self.config.links {
            match self.registry.create(&link.path, &link.url) {
                Ok(_) => registered += 1,
                Err(e) => warn!("Skipping preloaded link {} -> {}: {}", link.path, link.url, e),
            }
        }
        info!(
            "Preloaded {}/{} configured links",
            registered,
            self.config.links.len()
        );
        registered
    }

    pub fn filesystem(&self, mount: &MountOptions) -> UrlFilesystem {
        UrlFilesystem::new(
            Arc::clone(&self.registry),
            AttrContext::current(),
            mount.attr_ttl(),
            self.runtime.clone(),
        )
    }

    /// Mount at `mountpoint` and serve until unmounted.
    ///
    /// `extra_opts` are `-o` style options applied over the `[mount]` section.
    pub fn run(&self, mountpoint: &Path, extra_opts: Option<&str>) -> Result<()> {
        self.set_state(ServerState::Starting);

        let result = self.mount(mountpoint, extra_opts);
        match &result {
            Ok(()) => self.set_state(ServerState::Stopped),
            Err(_) => self.set_state(ServerState::Error),
        }
        result
    }

    fn mount(&self, mountpoint: &Path, extra_opts: Option<&str>) -> Result<()> {
        let mount_failed = |reason: String| FuseError::MountFailed {
            mountpoint: mountpoint.display().to_string(),
            reason,
        };

        validate_mountpoint(mountpoint).map_err(|e| mount_failed(e.to_string()))?;
        let options = parse_mount_options(&self.config.mount, extra_opts.unwrap_or_default())
            .map_err(|e| mount_failed(e.to_string()))?;

        let fs = self.filesystem(&options);
        info!(
            "Mounting urlfs at {} ({} entries)",
            mountpoint.display(),
            self.registry.len()
        );
        self.set_state(ServerState::Running);
        fuser::mount2(fs, mountpoint, &options_to_fuser(&options))
            .map_err(|e| mount_failed(e.to_string()))?;
        info!("Unmounted {}", mountpoint.display());
        Ok(())
    }
}
