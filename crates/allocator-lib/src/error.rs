//! Error types for the allocation engine

use thiserror::Error;

/// Failures surfaced by allocation calls
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AllocationError {
    /// Requirements exceed every entry in the catalog. This points at a
    /// catalog or profile misconfiguration and must not be papered over.
    #[error(
        "no suitable resource class for '{workload_type}': requires {cores} cores and {memory_gb} GB memory"
    )]
    NoSuitableResource {
        workload_type: String,
        cores: u32,
        memory_gb: f64,
    },

    #[error("invalid allocation request: {0}")]
    InvalidRequest(String),
}

/// Failures while building or loading a resource catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("resource catalog is empty")]
    Empty,

    #[error("duplicate resource class id '{0}'")]
    DuplicateClass(String),

    #[error("invalid resource class '{id}': {reason}")]
    InvalidClass { id: String, reason: String },

    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Returned when a policy, priority or similar name cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}' (expected one of: {expected})")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static str,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str, expected: &'static str) -> Self {
        Self {
            kind,
            value: value.to_string(),
            expected,
        }
    }
}
