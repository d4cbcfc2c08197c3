//! Module for application configuration settings.
//!
//! User configurations may be specified in a configuration file. A missing file means defaults.

use std::path::{Path, PathBuf};

use kernfs::fs::Credentials;
use kernfs::sysfs::SysfsConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

fn current_uid() -> u32 {
    nix::unistd::Uid::current().as_raw()
}

fn current_gid() -> u32 {
    nix::unistd::Gid::current().as_raw()
}

/// Application configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Inputs for the mounted sysfs tree.
    #[serde(default)]
    pub sysfs: SysfsConfig,

    /// The user paths are resolved as. If not specified, the current user.
    #[serde(default = "current_uid")]
    pub uid: u32,

    /// The group paths are resolved as. If not specified, the current group.
    #[serde(default = "current_gid")]
    pub gid: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sysfs: SysfsConfig::default(),
            uid: current_uid(),
            gid: current_gid(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration validation errors: {0:?}")]
    ValidationErrors(Vec<String>),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Config {
    /// Validate the correctness of the configuration.
    ///
    /// Returns:
    /// - `Ok(())` if the configuration is valid.
    /// - `Err(Vec<String>)` containing a list of validation error messages otherwise.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let errors = self.sysfs.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// The credentials paths are resolved with.
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.uid, self.gid)
    }

    /// Returns config file paths in descending priority order.
    /// On macOS, skips `dirs::config_dir()` (resolves to ~/Library/Application Support/).
    fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        #[cfg(not(target_os = "macos"))]
        if let Some(xdg) = dirs::config_dir() {
            paths.push(xdg.join("kernfs").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config").join("kernfs").join("config.toml"));
        }

        paths.push(PathBuf::from("/etc/kernfs/config.toml"));

        paths
    }

    /// Finds the first existing config file from search paths.
    fn find_config_file() -> Option<PathBuf> {
        Self::config_search_paths().into_iter().find(|p| p.exists())
    }

    /// Loads config from a single TOML file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = ?path, "Loading configuration file.");
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Loads configuration from the external path if given, else the first config file found.
    pub fn load(external_config_path: Option<&Path>) -> Option<Result<Self, ConfigError>> {
        if let Some(path) = external_config_path {
            return Some(Self::load_from_file(path));
        }

        Self::find_config_file().map(|path| Self::load_from_file(&path))
    }

    /// Loads and validates config, falling back to defaults if no file exists.
    /// Errors if a config file exists but is malformed or invalid.
    pub fn load_or_default(external_config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(res) = Self::load(external_config_path) else {
            debug!("No configuration file found, using defaults.");
            return Ok(Self::default());
        };
        let config = res?;
        config.validate().map_err(ConfigError::ValidationErrors)?;
        debug!("Loaded configuration successfully.");
        Ok(config)
    }
}
