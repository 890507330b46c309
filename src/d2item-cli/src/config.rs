//! Configuration management for d2item CLI

use anyhow::{Context, Result};
use d2item::{CodecOptions, GameMode, ItemVersion, TreeStyle};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: Option<ItemVersion>,
    pub mode: Option<GameMode>,
    pub style: Option<TreeStyle>,
    /// Back up files before overwriting them
    pub backup: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            version: None,
            mode: None,
            style: None,
            backup: true,
        }
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        if let Some(path) = std::env::var_os("D2ITEM_CONFIG") {
            return Ok(PathBuf::from(path));
        }
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("d2item");

        Ok(config_dir.join("config.toml"))
    }

    /// Load configuration from file, or the defaults if it doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&contents).context("Failed to parse config file")
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory at {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;

        Ok(())
    }

    /// Codec defaults with command-line values taking precedence
    pub fn options(
        &self,
        version: Option<ItemVersion>,
        mode: Option<GameMode>,
        style: Option<TreeStyle>,
    ) -> CodecOptions {
        let defaults = CodecOptions::default();
        CodecOptions::default()
            .with_version(version.or(self.version).unwrap_or(defaults.version))
            .with_mode(mode.or(self.mode).unwrap_or(defaults.mode))
            .with_style(style.or(self.style).unwrap_or(defaults.style))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("none.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert!(config.backup);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config {
            version: Some(ItemVersion::V110),
            mode: Some(GameMode::Classic),
            style: Some(TreeStyle::Pascal),
            backup: false,
        };
        config.save_to(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("version = \"v110\""));
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "mode = \"classic\"\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.mode, Some(GameMode::Classic));
        assert!(config.backup);
    }

    #[test]
    fn test_arguments_override_config() {
        let config = Config {
            version: Some(ItemVersion::V109),
            mode: Some(GameMode::Classic),
            ..Config::default()
        };
        let options = config.options(Some(ItemVersion::V110), None, None);
        assert_eq!(options.version, ItemVersion::V110);
        assert_eq!(options.mode, GameMode::Classic);
        assert_eq!(options.style, TreeStyle::Snake);
    }
}
