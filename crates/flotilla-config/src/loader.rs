//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::settings::{parse_csv, ConfigFile, RunSettings, SkipDirs, DEFAULT_SKIP_DIRS};
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// Project configuration file name
pub const PROJECT_CONFIG_FILE: &str = "flotilla.toml";

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.flotilla/config.toml) - lowest priority
/// 2. Project config (./flotilla.toml) - overrides global
/// 3. Environment variables (FLOTILLA_*) - overrides project
/// 4. CLI flags - highest priority (handled by caller)
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Effective `[flotilla]` settings after merging
    pub settings: RunSettings,

    /// Directory where flotilla.toml was found (or the explicit file's directory)
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Create a loader that reads its global config from a fixed path
    pub fn with_global_path(path: impl Into<PathBuf>) -> Self {
        Self {
            global_config_path: Some(path.into()),
        }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find flotilla.toml, then merges it over
    /// the global config and applies environment overrides.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project) = self.find_project_config(start_dir)?;
        let global = self.load_global_config()?;

        let settings = global.settings().merge(project.settings());
        let settings = self.apply_env_overrides(settings)?;

        Ok(Config {
            settings,
            project_root,
        })
    }

    /// Load configuration from a specific project config file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let project = ConfigFile::load_from_file(config_path)?;
        let global = self.load_global_config()?;

        let settings = global.settings().merge(project.settings());
        let settings = self.apply_env_overrides(settings)?;

        Ok(Config {
            settings,
            project_root: config_path.parent().map(|p| p.to_path_buf()),
        })
    }

    /// Find project configuration by walking up directory tree
    ///
    /// Returns (project_root, config); a missing file yields the default config.
    fn find_project_config(&self, start_dir: &Path) -> ConfigResult<(Option<PathBuf>, ConfigFile)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(PROJECT_CONFIG_FILE);

            if config_path.is_file() {
                let config = ConfigFile::load_from_file(&config_path)?;
                return Ok((Some(current), config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, ConfigFile::default())),
            }
        }
    }

    /// Load global configuration from ~/.flotilla/config.toml
    ///
    /// The global file is optional. A missing home directory is not an error either.
    fn load_global_config(&mut self) -> ConfigResult<ConfigFile> {
        if self.global_config_path.is_none() {
            match Self::global_config_dir() {
                Ok(dir) => self.global_config_path = Some(dir.join("config.toml")),
                Err(ConfigError::HomeNotFound) => return Ok(ConfigFile::default()),
                Err(e) => return Err(e),
            }
        }

        match self.global_config_path.as_deref() {
            Some(path) if path.is_file() => ConfigFile::load_from_file(path),
            _ => Ok(ConfigFile::default()),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Recognized: FLOTILLA_NUM_PROCS, FLOTILLA_SKIP_DIRS (comma-separated), FLOTILLA_TIMEOUT
    fn apply_env_overrides(&self, mut settings: RunSettings) -> ConfigResult<RunSettings> {
        if let Ok(value) = env::var("FLOTILLA_NUM_PROCS") {
            let procs = value
                .trim()
                .parse::<usize>()
                .map_err(|e| ConfigError::InvalidValue {
                    field: "FLOTILLA_NUM_PROCS".to_string(),
                    reason: e.to_string(),
                })?;
            settings.num_procs = Some(procs);
        }

        if let Ok(value) = env::var("FLOTILLA_SKIP_DIRS") {
            settings.skip_dirs = Some(SkipDirs::List(parse_csv(&value)));
        }

        if let Ok(value) = env::var("FLOTILLA_TIMEOUT") {
            let timeout = value
                .trim()
                .parse::<f64>()
                .map_err(|e| ConfigError::InvalidValue {
                    field: "FLOTILLA_TIMEOUT".to_string(),
                    reason: e.to_string(),
                })?;
            settings.timeout = Some(timeout);
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Get the global configuration directory (~/.flotilla)
    pub fn global_config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".flotilla"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Directory-name globs to skip (configured list or the defaults)
    pub fn skip_dirs(&self) -> Vec<String> {
        match &self.settings.skip_dirs {
            Some(skip) => skip.entries(),
            None => DEFAULT_SKIP_DIRS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Configured worker count, if any
    pub fn num_procs(&self) -> Option<usize> {
        self.settings.num_procs
    }

    /// Member-name globs (default `test*`)
    pub fn test_globs(&self) -> Vec<String> {
        self.settings
            .test_glob
            .clone()
            .unwrap_or_else(|| vec!["test*".to_string()])
    }

    /// Module file-name glob (default `test*.rs`)
    pub fn module_pattern(&self) -> &str {
        self.settings.module_pattern.as_deref().unwrap_or("test*.rs")
    }

    /// Configured timeout in seconds
    pub fn timeout(&self) -> Option<f64> {
        self.settings.timeout
    }

    /// Get the project root directory
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn create_config_file(dir: &Path, content: &str) -> PathBuf {
        let config_path = dir.join(PROJECT_CONFIG_FILE);
        fs::write(&config_path, content).unwrap();
        config_path
    }

    fn isolated_loader(home: &TempDir) -> ConfigLoader {
        ConfigLoader::with_global_path(home.path().join("config.toml"))
    }

    #[test]
    #[serial]
    fn test_load_project_config() {
        let home = TempDir::new().unwrap();
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[flotilla]
num_procs = 3
"#,
        );

        let mut loader = isolated_loader(&home);
        let config = loader.load_from_directory(temp_dir.path()).unwrap();

        assert_eq!(config.num_procs(), Some(3));
        assert_eq!(config.project_root(), Some(temp_dir.path()));
    }

    #[test]
    #[serial]
    fn test_find_config_in_parent() {
        let home = TempDir::new().unwrap();
        let temp_dir = TempDir::new().unwrap();
        create_config_file(temp_dir.path(), "[flotilla]\nskip_dirs = \"vendor\"\n");

        let sub_dir = temp_dir.path().join("subdir");
        fs::create_dir(&sub_dir).unwrap();

        let mut loader = isolated_loader(&home);
        let config = loader.load_from_directory(&sub_dir).unwrap();

        assert_eq!(config.skip_dirs(), vec!["vendor".to_string()]);
    }

    #[test]
    #[serial]
    fn test_defaults_without_any_file() {
        let home = TempDir::new().unwrap();
        let temp_dir = TempDir::new().unwrap();

        let mut loader = isolated_loader(&home);
        let config = loader.load_from_directory(temp_dir.path()).unwrap();

        assert_eq!(config.num_procs(), None);
        assert_eq!(config.test_globs(), vec!["test*".to_string()]);
        assert_eq!(config.module_pattern(), "test*.rs");
        assert!(config.skip_dirs().contains(&"target".to_string()));
    }

    #[test]
    #[serial]
    fn test_project_overrides_global() {
        let home = TempDir::new().unwrap();
        fs::write(
            home.path().join("config.toml"),
            "[flotilla]\nnum_procs = 2\nskip_dirs = \"contrib\"\n",
        )
        .unwrap();
        let temp_dir = TempDir::new().unwrap();
        create_config_file(temp_dir.path(), "[flotilla]\nnum_procs = 6\n");

        let mut loader = isolated_loader(&home);
        let config = loader.load_from_directory(temp_dir.path()).unwrap();

        assert_eq!(config.num_procs(), Some(6));
        assert_eq!(config.skip_dirs(), vec!["contrib".to_string()]);
    }

    #[test]
    #[serial]
    fn test_env_override_num_procs() {
        let home = TempDir::new().unwrap();
        let temp_dir = TempDir::new().unwrap();
        create_config_file(temp_dir.path(), "[flotilla]\nnum_procs = 2\n");

        env::set_var("FLOTILLA_NUM_PROCS", "5");

        let mut loader = isolated_loader(&home);
        let config = loader.load_from_directory(temp_dir.path()).unwrap();
        assert_eq!(config.num_procs(), Some(5));

        env::remove_var("FLOTILLA_NUM_PROCS");
    }

    #[test]
    #[serial]
    fn test_env_override_bad_value() {
        let home = TempDir::new().unwrap();
        let temp_dir = TempDir::new().unwrap();

        env::set_var("FLOTILLA_NUM_PROCS", "many");

        let mut loader = isolated_loader(&home);
        let result = loader.load_from_directory(temp_dir.path());
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));

        env::remove_var("FLOTILLA_NUM_PROCS");
    }

    #[test]
    #[serial]
    fn test_load_from_specific_file() {
        let home = TempDir::new().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("custom.toml");
        fs::write(&path, "[flotilla]\ntimeout = 12.5\n").unwrap();

        let mut loader = isolated_loader(&home);
        let config = loader.load_from_file(&path).unwrap();

        assert_eq!(config.timeout(), Some(12.5));
    }
}
