//! Configuration management for layerfs

use crate::error::{Error, Result};
use crate::fs::overlay::{MergeStrategy, OverlayFs, OverlayOptions};
use crate::fs::{Filesystem, FilterFs, OsFs};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default cache duration: 0 (overlay copies never expire)
pub const DEFAULT_CACHE_DURATION_SECS: u64 = 0;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base (authoritative) directory
    pub base_dir: PathBuf,

    /// Overlay (cache) directory
    pub overlay_dir: PathBuf,

    /// Seconds an overlay copy is trusted before the base is checked again
    /// (0 = forever)
    pub cache_duration_secs: u64,

    /// Precedence for merged directory listings
    pub merge: MergeOrder,

    /// Only base files whose name matches this regex are visible
    pub include_pattern: Option<String>,

    /// Reject every mutation of the base directory
    pub read_only_base: bool,
}

/// Which store wins when both list the same name
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum MergeOrder {
    /// Overlay entries first; the overlay copy shadows the base copy
    #[default]
    OverlayFirst,
    /// Base entries first; the base copy shadows the overlay copy
    BaseFirst,
}

impl MergeOrder {
    pub fn strategy(self) -> MergeStrategy {
        match self {
            MergeOrder::OverlayFirst => MergeStrategy::overlay_first(),
            MergeOrder::BaseFirst => MergeStrategy::base_first(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let overlay_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("layerfs")
            .join("overlay");

        Config {
            base_dir: PathBuf::new(),
            overlay_dir,
            cache_duration_secs: DEFAULT_CACHE_DURATION_SECS,
            merge: MergeOrder::default(),
            include_pattern: None,
            read_only_base: false,
        }
    }
}

impl Config {
    /// Load configuration from a file, with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!("Failed to read config file: {}", e))
        })?;

        let mut config: Config = serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse config file: {}", e))
        })?;

        // Override with environment variables if set
        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("LAYERFS_BASE_DIR") {
            let dir = dir.trim();
            if !dir.is_empty() {
                self.base_dir = PathBuf::from(dir);
            }
        }

        if let Ok(dir) = std::env::var("LAYERFS_OVERLAY_DIR") {
            let dir = dir.trim();
            if !dir.is_empty() {
                self.overlay_dir = PathBuf::from(dir);
            }
        }

        if let Ok(secs) = std::env::var("LAYERFS_CACHE_DURATION") {
            if let Ok(secs) = secs.trim().parse::<u64>() {
                self.cache_duration_secs = secs;
            }
        }
    }

    /// Defaults plus environment overrides, for running without a config file.
    /// Not validated: command-line flags may still fill in the directories.
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Save configuration to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            Error::Config(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path.as_ref(), content).map_err(|e| {
            Error::Config(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.base_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "Base directory is required".to_string(),
            ));
        }

        if self.overlay_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "Overlay directory is required".to_string(),
            ));
        }

        if self.base_dir == self.overlay_dir {
            return Err(Error::InvalidConfig(
                "Base and overlay directories must differ".to_string(),
            ));
        }

        if let Some(pattern) = &self.include_pattern {
            regex::Regex::new(pattern)?;
        }

        Ok(())
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.overlay_dir)?;
        Ok(())
    }

    pub fn cache_duration(&self) -> Duration {
        Duration::from_secs(self.cache_duration_secs)
    }

    /// Construction options for the overlay
    pub fn overlay_options(&self) -> OverlayOptions {
        OverlayOptions::new()
            .with_cache_duration(self.cache_duration())
            .with_merge(self.merge.strategy())
    }

    /// Build the overlay view described by this configuration
    pub fn open_filesystem(&self) -> Result<OverlayFs> {
        let mut base: Arc<dyn Filesystem> = Arc::new(OsFs::new(&self.base_dir)?);

        if let Some(pattern) = &self.include_pattern {
            base = Arc::new(FilterFs::with_pattern(base, pattern)?);
        }
        if self.read_only_base {
            base = Arc::new(FilterFs::read_only(base));
        }

        let overlay: Arc<dyn Filesystem> = Arc::new(OsFs::new(&self.overlay_dir)?);
        Ok(OverlayFs::new(base, overlay, self.overlay_options()))
    }
}
