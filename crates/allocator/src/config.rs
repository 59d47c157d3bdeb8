//! Service configuration

use allocator_lib::{Policy, ResourceCatalog};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

const ENV_PREFIX: &str = "ALLOCATOR";

/// Runner allocator configuration, read from `ALLOCATOR_*` variables
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Instance name attached to decision logs
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// Port for the decision API, health and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// JSON resource catalog replacing the built-in one
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,

    /// Policy for requests that do not name one
    #[serde(default)]
    pub default_policy: Policy,

    /// Cost ceiling for requests that do not set one
    #[serde(default)]
    pub default_cost_ceiling: Option<f64>,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "runner-allocator".to_string())
}

fn default_api_port() -> u16 {
    8080
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            api_port: default_api_port(),
            catalog_path: None,
            default_policy: Policy::default(),
            default_cost_ceiling: None,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the process environment
    pub fn load() -> Result<Self> {
        Self::from_environment(None)
    }

    /// Load from an explicit variable map instead of the process environment
    pub fn from_environment(vars: Option<HashMap<String, String>>) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .source(vars),
            )
            .build()
            .context("Failed to read ALLOCATOR_* environment")?;

        let loaded: Self = config
            .try_deserialize()
            .context("Invalid ALLOCATOR_* configuration")?;

        if let Some(ceiling) = loaded.default_cost_ceiling {
            anyhow::ensure!(
                ceiling.is_finite() && ceiling >= 0.0,
                "ALLOCATOR_DEFAULT_COST_CEILING must be non-negative, got {ceiling}"
            );
        }
        Ok(loaded)
    }

    /// The configured catalog, or the built-in one when no path is set
    pub fn load_catalog(&self) -> Result<ResourceCatalog> {
        match &self.catalog_path {
            Some(path) => ResourceCatalog::from_json_file(path)
                .with_context(|| format!("Failed to load catalog from {}", path.display())),
            None => Ok(ResourceCatalog::builtin()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::from_environment(vars(&[])).unwrap();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.default_policy, Policy::Balanced);
        assert!(config.catalog_path.is_none());
        assert!(config.default_cost_ceiling.is_none());
    }

    #[test]
    fn test_reads_prefixed_variables() {
        let config = ServiceConfig::from_environment(vars(&[
            ("ALLOCATOR_API_PORT", "9191"),
            ("ALLOCATOR_DEFAULT_POLICY", "cost-optimization"),
            ("ALLOCATOR_DEFAULT_COST_CEILING", "0.5"),
        ]))
        .unwrap();

        assert_eq!(config.api_port, 9191);
        assert_eq!(config.default_policy, Policy::CostOptimization);
        assert_eq!(config.default_cost_ceiling, Some(0.5));
    }

    #[test]
    fn test_rejects_negative_ceiling() {
        let result = ServiceConfig::from_environment(vars(&[(
            "ALLOCATOR_DEFAULT_COST_CEILING",
            "-1",
        )]));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_catalog_file_is_an_error() {
        let config = ServiceConfig {
            catalog_path: Some(PathBuf::from("/nonexistent/catalog.json")),
            ..ServiceConfig::default()
        };
        assert!(config.load_catalog().is_err());
    }

    #[test]
    fn test_builtin_catalog_without_path() {
        let catalog = ServiceConfig::default().load_catalog().unwrap();
        assert_eq!(catalog.len(), ResourceCatalog::builtin().len());
    }
}
