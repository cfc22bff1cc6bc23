//! Configuration loading from TOML files

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use skimline_core::source::{DEFAULT_STEP_SIZE, DEFAULT_TREE_NAME};
use skimline_core::DEFAULT_WEIGHT_COLUMN;

/// Global configuration for skimline
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub read: ReadConfig,
    pub workers: WorkersConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub default_dir: PathBuf,
    pub compression_level: i32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_dir: PathBuf::from("./output"),
            compression_level: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReadConfig {
    /// Tree read from ROOT files
    pub tree_name: String,
    /// Entries per unit when reading ROOT files
    pub step_size: u64,
    pub weight_column: String,
}

impl Default for ReadConfig {
    fn default() -> Self {
        Self {
            tree_name: DEFAULT_TREE_NAME.to_string(),
            step_size: DEFAULT_STEP_SIZE,
            weight_column: DEFAULT_WEIGHT_COLUMN.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub default: usize,
    pub max: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            default: cpus.min(8),
            max: 16,
        }
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./skimline.toml (current directory)
    /// 2. ~/.config/skimline/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("skimline.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "skimline") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.output.default_dir, PathBuf::from("./output"));
        assert_eq!(config.output.compression_level, 3);
        assert_eq!(config.read.tree_name, "analysis");
        assert_eq!(config.read.weight_column, "totalWeight");
        assert!(config.workers.default >= 1);
    }

    #[test]
    fn parse_config_toml() {
        let toml = r#"
[output]
default_dir = "/tmp/skims"
compression_level = 5

[read]
tree_name = "mini"
step_size = 5000

[workers]
default = 4
max = 8
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.output.default_dir, PathBuf::from("/tmp/skims"));
        assert_eq!(config.output.compression_level, 5);
        assert_eq!(config.read.tree_name, "mini");
        assert_eq!(config.read.step_size, 5000);
        // unset keys keep their defaults
        assert_eq!(config.read.weight_column, "totalWeight");
        assert_eq!(config.workers.max, 8);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = Config::from_file(Path::new("/nonexistent/skimline.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
