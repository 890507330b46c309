//! Configuration command handlers
//!
//! Handles the `configure` subcommand for setting up d2item CLI defaults.

use crate::config::Config;
use anyhow::Result;
use d2item::{GameMode, ItemVersion, TreeStyle};

/// Settings given on the command line
#[derive(Debug, Default)]
pub struct Changes {
    pub version: Option<ItemVersion>,
    pub mode: Option<GameMode>,
    pub style: Option<TreeStyle>,
    pub backup: Option<bool>,
}

impl Changes {
    fn is_empty(&self) -> bool {
        self.version.is_none() && self.mode.is_none() && self.style.is_none() && self.backup.is_none()
    }

    fn apply(self, config: &mut Config) {
        if let Some(version) = self.version {
            config.version = Some(version);
        }
        if let Some(mode) = self.mode {
            config.mode = Some(mode);
        }
        if let Some(style) = self.style {
            config.style = Some(style);
        }
        if let Some(backup) = self.backup {
            config.backup = backup;
        }
    }
}

/// Handle the configure command
pub fn handle(changes: Changes, show: bool) -> Result<()> {
    let mut config = Config::load()?;

    if show {
        show_config(&config);
        return Ok(());
    }

    if changes.is_empty() {
        show_usage();
        return Ok(());
    }

    changes.apply(&mut config);
    config.save()?;
    show_config(&config);
    Ok(())
}

fn show_config(config: &Config) {
    let unset = |value: Option<String>| value.unwrap_or_else(|| "(default)".to_string());
    println!("Item version: {}", unset(config.version.map(|v| v.to_string())));
    println!("Game mode:    {}", unset(config.mode.map(|m| m.to_string())));
    println!("Tree style:   {}", unset(config.style.map(|s| s.to_string())));
    println!("Backups:      {}", if config.backup { "on" } else { "off" });

    if let Ok(path) = Config::config_path() {
        println!("Config file: {}", path.display());
    }
}

fn show_usage() {
    println!("Usage: d2item configure --item-version v110 --mode expansion");
    println!("   or: d2item configure --style pascal --backup false");
    println!("   or: d2item configure --show");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_changes() {
        let mut config = Config::default();
        let changes = Changes {
            version: Some(ItemVersion::V120),
            backup: Some(false),
            ..Changes::default()
        };
        assert!(!changes.is_empty());
        changes.apply(&mut config);
        assert_eq!(config.version, Some(ItemVersion::V120));
        assert_eq!(config.mode, None);
        assert!(!config.backup);
    }

    #[test]
    fn test_empty_changes() {
        assert!(Changes::default().is_empty());
    }
}
