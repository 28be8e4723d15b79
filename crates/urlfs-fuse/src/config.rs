//! Daemon configuration, loaded from TOML or JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FuseError, Result};
use crate::fakefile;
use crate::mount::MountOptions;
use crate::network::NetworkConfig;
use crate::registry::RegistryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

/// A link registered when the daemon starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSpec {
    pub path: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrlfsConfig {
    pub registry: RegistryConfig,
    pub mount: MountOptions,
    pub network: NetworkConfig,
    pub logging: LoggingConfig,
    pub links: Vec<LinkSpec>,
}

fn config_error(msg: impl Into<String>) -> FuseError {
    FuseError::Config { msg: msg.into() }
}

impl UrlfsConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: UrlfsConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents).map_err(|e| config_error(e.to_string()))?,
            "json" => serde_json::from_str(&contents).map_err(|e| config_error(e.to_string()))?,
            _ => {
                return Err(config_error(format!(
                    "Unsupported config file extension: {}",
                    ext
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.registry.capacity == 0 {
            return Err(config_error("registry.capacity must be > 0"));
        }
        if self.links.len() > self.registry.capacity {
            return Err(config_error(format!(
                "{} preloaded links exceed registry.capacity {}",
                self.links.len(),
                self.registry.capacity
            )));
        }
        if self.mount.allow_other && self.mount.allow_root {
            return Err(config_error(
                "mount.allow_other and mount.allow_root are mutually exclusive",
            ));
        }
        for link in &self.links {
            if !link.path.starts_with('/') {
                return Err(config_error(format!(
                    "link path must be absolute: {}",
                    link.path
                )));
            }
            // Preloaded links must be reachable through the root directory.
            fakefile::validate_link_name(fakefile::entry_name(&link.path))
                .map_err(|e| config_error(format!("link {}: {}", link.path, e)))?;
        }
        Ok(())
    }
}
