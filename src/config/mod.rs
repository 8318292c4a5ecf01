//! Configuration module for datavis-core
//!
//! The configuration controls what gets written into session stream headers,
//! how large pipeline caches grow and how logging is set up.
//!
//! # Config Location
//!
//! The configuration file lives in the platform-appropriate config directory:
//! - **Linux**: `~/.config/dev.hxyulin.datavis-core/config.toml`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.datavis-core/config.toml`
//! - **Windows**: `%APPDATA%\dev.hxyulin.datavis-core\config.toml`
//!
//! # Example
//!
//! ```ignore
//! use datavis_core::config::CoreConfig;
//!
//! let config = CoreConfig::load_or_default(CoreConfig::default_path().unwrap());
//! let header = config.stream_header();
//! ```

use crate::error::{CoreError, Result};
use crate::io::format::{FloatWidth, ProductInfo, StreamHeader};
use crate::pipeline::DEFAULT_CACHE_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for config directories
pub const APP_ID: &str = "dev.hxyulin.datavis-core";

/// Config filename
pub const CONFIG_FILE: &str = "config.toml";

/// Default log filter when neither the environment nor the config sets one
pub const DEFAULT_LOG_FILTER: &str = "info,datavis_core=debug";

/// Get the application config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

// ==================== Stream Settings ====================

/// Settings applied to every session stream that is written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Width of floating-point values in written streams
    #[serde(default)]
    pub float_width: FloatWidth,

    /// Product information recorded in the stream header
    #[serde(default)]
    pub product: ProductInfo,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            float_width: FloatWidth::Double,
            product: ProductInfo::default(),
        }
    }
}

// ==================== Pipeline Settings ====================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of evaluated states each pipeline keeps
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

// ==================== Logging Settings ====================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Directory for daily log files; console only when unset
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            directory: None,
        }
    }
}

// ==================== Core Config ====================

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CoreConfig {
    /// Path of the config file in the default location
    pub fn default_path() -> Option<PathBuf> {
        config_dir().map(|p| p.join(CONFIG_FILE))
    }

    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        toml::from_str(&content).map_err(|e| {
            CoreError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })
    }

    /// Load a config file, returning defaults if any error occurs
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save config file to disk as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CoreError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| CoreError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            CoreError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Header for streams written with this configuration
    pub fn stream_header(&self) -> StreamHeader {
        StreamHeader::new(self.stream.float_width, self.stream.product.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = CoreConfig::default();
        config.stream.float_width = FloatWidth::Single;
        config.pipeline.cache_capacity = 8;
        config.logging.directory = Some(dir.path().join("logs"));
        config.save(&path).unwrap();

        let loaded = CoreConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.stream_header().float_width, FloatWidth::Single);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: CoreConfig = toml::from_str("[pipeline]\ncache_capacity = 2\n").unwrap();
        assert_eq!(config.pipeline.cache_capacity, 2);
        assert_eq!(config.logging.filter, DEFAULT_LOG_FILTER);
        assert_eq!(config.stream.float_width, FloatWidth::Double);
    }

    #[test]
    fn test_invalid_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "pipeline = 3").unwrap();
        assert!(matches!(CoreConfig::load(&path), Err(CoreError::Config(_))));
        assert_eq!(CoreConfig::load_or_default(&path), CoreConfig::default());
        assert_eq!(
            CoreConfig::load_or_default(dir.path().join("missing.toml")),
            CoreConfig::default()
        );
    }
}
