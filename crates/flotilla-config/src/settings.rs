//! The `[flotilla]` configuration section
//!
//! Both the global file and the project file share this layout.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Directory names skipped during discovery when nothing is configured
pub const DEFAULT_SKIP_DIRS: &[&str] = &["target", "build", ".git"];

/// A configuration file (global or project)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Run settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flotilla: Option<RunSettings>,
}

/// Settings recognized under `[flotilla]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct RunSettings {
    /// Directory name globs excluded from discovery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_dirs: Option<SkipDirs>,

    /// Worker process count override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_procs: Option<usize>,

    /// Member name globs (default: `test*`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_glob: Option<Vec<String>>,

    /// Module file name glob (default: `test*.rs`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_pattern: Option<String>,

    /// Per-test timeout in seconds for isolated and distributed runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
}

/// Skip list, written either as a TOML array or as a comma-separated string
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SkipDirs {
    /// `skip_dirs = ["build", "target"]`
    List(Vec<String>),
    /// `skip_dirs = "build, target"`
    Csv(String),
}

impl SkipDirs {
    /// Normalized, non-empty entries
    pub fn entries(&self) -> Vec<String> {
        match self {
            SkipDirs::List(items) => items
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            SkipDirs::Csv(text) => parse_csv(text),
        }
    }
}

/// Split a comma-separated list, dropping blanks
pub fn parse_csv(text: &str) -> Vec<String> {
    text.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl ConfigFile {
    /// Load a configuration file from disk
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        Self::parse(&content, path)
    }

    /// Parse configuration text; `origin` is only used in error messages
    pub fn parse(content: &str, origin: &Path) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::TomlParseError {
            file: origin.to_path_buf(),
            error: e,
        })?;

        if let Some(settings) = &config.flotilla {
            settings.validate()?;
        }
        Ok(config)
    }

    /// The `[flotilla]` section, or an empty one
    pub fn settings(&self) -> RunSettings {
        self.flotilla.clone().unwrap_or_default()
    }
}

impl RunSettings {
    /// Validate value ranges
    pub fn validate(&self) -> ConfigResult<()> {
        if self.num_procs == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "flotilla.num_procs".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        if let Some(timeout) = self.timeout {
            if timeout.is_nan() || timeout <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: "flotilla.timeout".to_string(),
                    reason: format!("must be a positive number of seconds, got {}", timeout),
                });
            }
        }

        if let Some(globs) = &self.test_glob {
            if globs.iter().any(|g| g.trim().is_empty()) {
                return Err(ConfigError::InvalidValue {
                    field: "flotilla.test_glob".to_string(),
                    reason: "patterns must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Overlay `other` on top of `self`; fields set in `other` win
    pub fn merge(self, other: RunSettings) -> RunSettings {
        RunSettings {
            skip_dirs: other.skip_dirs.or(self.skip_dirs),
            num_procs: other.num_procs.or(self.num_procs),
            test_glob: other.test_glob.or(self.test_glob),
            module_pattern: other.module_pattern.or(self.module_pattern),
            timeout: other.timeout.or(self.timeout),
        }
    }
}
