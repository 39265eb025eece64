//! Flotilla Configuration System
//!
//! Provides configuration management for flotilla test runs:
//! - Global user configuration (~/.flotilla/config.toml)
//! - Project configuration (flotilla.toml, found by walking up from the working directory)
//! - Environment variable overrides (FLOTILLA_*)
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Global config (~/.flotilla/config.toml)
//! 2. Project config (./flotilla.toml or an explicit file)
//! 3. Environment variables (FLOTILLA_*)
//! 4. CLI flags (applied by the caller)
//!
//! Every file uses a single `[flotilla]` section:
//!
//! ```toml
//! [flotilla]
//! skip_dirs = "build, target, contrib"
//! num_procs = 4
//! ```
//!
//! # Example
//!
//! ```no_run
//! use flotilla_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("skipping {:?}", config.skip_dirs());
//! ```

pub mod loader;
pub mod settings;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use loader::{Config, ConfigLoader};
pub use settings::{ConfigFile, RunSettings, SkipDirs};
