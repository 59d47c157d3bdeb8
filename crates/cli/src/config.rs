//! Configuration management for the CLI

use crate::output::OutputFormat;
use allocator_lib::{Policy, ResourceCatalog};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI configuration, stored at `~/.config/rae/config.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Policy used when `--policy` is not given
    pub default_policy: Option<Policy>,
    /// Cost ceiling used when `--cost-ceiling` is not given
    pub default_cost_ceiling: Option<f64>,
    /// Resource catalog replacing the built-in one
    pub catalog_path: Option<PathBuf>,
    /// Output format used when `--format` is not given
    #[serde(default)]
    pub default_format: Option<OutputFormat>,
}

impl Config {
    /// Load configuration from file; a missing file means defaults
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Get the configuration file path
    fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("rae").join("config.json"))
    }

    /// Catalog from the flag, then the config file, then the built-in one
    pub fn catalog(&self, flag: Option<&Path>) -> Result<ResourceCatalog> {
        match flag.or(self.catalog_path.as_deref()) {
            Some(path) => ResourceCatalog::from_json_file(path)
                .with_context(|| format!("Failed to load catalog from {}", path.display())),
            None => Ok(ResourceCatalog::builtin()),
        }
    }

    pub fn policy(&self, flag: Option<Policy>) -> Policy {
        flag.or(self.default_policy).unwrap_or_default()
    }

    pub fn cost_ceiling(&self, flag: Option<f64>) -> Option<f64> {
        flag.or(self.default_cost_ceiling)
    }

    pub fn format(&self, flag: Option<OutputFormat>) -> OutputFormat {
        flag.or(self.default_format).unwrap_or_default()
    }
}
