//! Resource catalog
//!
//! The fixed table of execution resource classes. A catalog is built once at
//! startup, validated, and then shared read-only (usually behind an `Arc`)
//! by every component that needs it.

use crate::error::CatalogError;
use crate::models::ResourceClass;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

/// Standard 2-core hosted Linux runner
pub const UBUNTU_LATEST: &str = "ubuntu-latest";
pub const UBUNTU_4_CORES: &str = "ubuntu-latest-4-cores";
pub const UBUNTU_8_CORES: &str = "ubuntu-latest-8-cores";
pub const UBUNTU_16_CORES: &str = "ubuntu-latest-16-cores";
/// Organisation-owned runner pool, the low-cost tier
pub const SELF_HOSTED_LINUX: &str = "self-hosted-linux";

/// Immutable table of resource classes
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceCatalog {
    classes: Vec<ResourceClass>,
}

impl ResourceCatalog {
    /// Build a catalog, rejecting empty tables, duplicate ids and classes
    /// with non-positive capacity or negative cost.
    pub fn new(classes: Vec<ResourceClass>) -> Result<Self, CatalogError> {
        if classes.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen = HashSet::new();
        for class in &classes {
            if !seen.insert(class.id.as_str()) {
                return Err(CatalogError::DuplicateClass(class.id.clone()));
            }
            validate_class(class)?;
        }

        Ok(Self { classes })
    }

    /// The built-in catalog of hosted Linux runners plus one self-hosted pool
    pub fn builtin() -> Self {
        Self {
            classes: vec![
                class(
                    UBUNTU_LATEST,
                    2,
                    7.0,
                    14.0,
                    0.008,
                    20,
                    false,
                    &[
                        "unit-tests",
                        "component-tests",
                        "api-tests",
                        "security-scan",
                        "lint",
                        "docs",
                    ],
                ),
                class(
                    UBUNTU_4_CORES,
                    4,
                    16.0,
                    150.0,
                    0.016,
                    10,
                    false,
                    &["integration-tests", "migration-tests", "api-tests", "build"],
                ),
                class(
                    UBUNTU_8_CORES,
                    8,
                    32.0,
                    300.0,
                    0.032,
                    10,
                    false,
                    &["e2e-tests", "build"],
                ),
                class(
                    UBUNTU_16_CORES,
                    16,
                    64.0,
                    600.0,
                    0.064,
                    5,
                    false,
                    &["performance-tests"],
                ),
                class(
                    SELF_HOSTED_LINUX,
                    2,
                    8.0,
                    100.0,
                    0.004,
                    4,
                    true,
                    &["build", "deploy"],
                ),
            ],
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let classes: Vec<ResourceClass> = serde_json::from_str(json)?;
        Self::new(classes)
    }

    /// Load a catalog from a JSON array of resource classes
    pub fn from_json_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn get(&self, id: &str) -> Option<&ResourceClass> {
        self.classes.iter().find(|c| c.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceClass> {
        self.classes.iter()
    }

    pub fn classes(&self) -> &[ResourceClass] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// One size step down from `id`: the largest core count strictly below
    /// it, cheapest among equals
    pub fn next_smaller(&self, id: &str) -> Option<&ResourceClass> {
        let current = self.get(id)?;
        self.classes
            .iter()
            .filter(|c| c.cores < current.cores)
            .min_by(|a, b| {
                b.cores
                    .cmp(&a.cores)
                    .then(a.cost_per_minute.total_cmp(&b.cost_per_minute))
            })
    }
}

impl Default for ResourceCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn validate_class(class: &ResourceClass) -> Result<(), CatalogError> {
    let invalid = |reason: &str| CatalogError::InvalidClass {
        id: class.id.clone(),
        reason: reason.to_string(),
    };

    if class.id.trim().is_empty() {
        return Err(invalid("id must not be empty"));
    }
    if class.cores == 0 {
        return Err(invalid("cores must be positive"));
    }
    if !(class.memory_gb.is_finite() && class.memory_gb > 0.0) {
        return Err(invalid("memory_gb must be positive"));
    }
    if !(class.cost_per_minute.is_finite() && class.cost_per_minute >= 0.0) {
        return Err(invalid("cost_per_minute must be non-negative"));
    }
    if class.max_concurrency == 0 {
        return Err(invalid("max_concurrency must be positive"));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn class(
    id: &str,
    cores: u32,
    memory_gb: f64,
    storage_gb: f64,
    cost_per_minute: f64,
    max_concurrency: u32,
    self_hosted: bool,
    affinity: &[&str],
) -> ResourceClass {
    ResourceClass {
        id: id.to_string(),
        cores,
        memory_gb,
        storage_gb,
        cost_per_minute,
        max_concurrency,
        self_hosted,
        affinity: affinity.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
    }
}
