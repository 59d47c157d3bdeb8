//! Core data models for the allocation engine

use crate::error::ParseEnumError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Scheduling priority of a unit of work
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(ParseEnumError::new("priority", other, "normal, high, critical")),
        }
    }
}

/// Operator policy applied by the selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Policy {
    /// Prefer low-cost (self-hosted) classes when they are affordable
    CostOptimization,
    /// Take the top-scored class and surface faster alternates first
    PerformanceOptimization,
    #[default]
    Balanced,
}

impl Policy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Policy::CostOptimization => "cost-optimization",
            Policy::PerformanceOptimization => "performance-optimization",
            Policy::Balanced => "balanced",
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Policy {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cost-optimization" | "cost" => Ok(Policy::CostOptimization),
            "performance-optimization" | "performance" => Ok(Policy::PerformanceOptimization),
            "balanced" => Ok(Policy::Balanced),
            other => Err(ParseEnumError::new(
                "policy",
                other,
                "cost-optimization, performance-optimization, balanced",
            )),
        }
    }
}

/// A named category of compute a job can run on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceClass {
    pub id: String,
    pub cores: u32,
    pub memory_gb: f64,
    pub storage_gb: f64,
    pub cost_per_minute: f64,
    pub max_concurrency: u32,
    /// Self-hosted classes are the low-cost tier preferred by cost optimization
    #[serde(default)]
    pub self_hosted: bool,
    /// Workload types this class is best suited for
    #[serde(default)]
    pub affinity: BTreeSet<String>,
}

impl ResourceClass {
    pub fn is_affine_to(&self, workload_type: &str) -> bool {
        self.affinity.contains(workload_type)
    }

    /// True if both cores and memory cover the requirement
    pub fn satisfies(&self, requirements: &ResourceRequirements) -> bool {
        self.cores >= requirements.cores && self.memory_gb >= requirements.memory_gb
    }
}

/// Canonical resource and behaviour characteristics of a workload type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadProfile {
    pub workload_type: String,
    pub cpu_intensive: bool,
    pub memory_intensive: bool,
    pub io_intensive: bool,
    pub network_intensive: bool,
    pub parallelizable: bool,
    pub avg_duration_minutes: f64,
    pub min_cores: u32,
    pub min_memory_gb: f64,
}

/// Caller-supplied overrides for the profile minimums
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceHints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cores: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_gb: Option<f64>,
}

fn default_parallelism() -> u32 {
    1
}

/// One scheduling request; consumed by a single allocation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub workload_type: String,
    /// Falls back to the profile's average duration when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration_minutes: Option<f64>,
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_hints: Option<ResourceHints>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub policy: Policy,
    /// Maximum acceptable estimated cost; unlimited when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_ceiling: Option<f64>,
}

impl AllocationRequest {
    pub fn new(workload_type: impl Into<String>) -> Self {
        Self {
            workload_type: workload_type.into(),
            estimated_duration_minutes: None,
            parallelism: 1,
            resource_hints: None,
            priority: Priority::Normal,
            policy: Policy::Balanced,
            cost_ceiling: None,
        }
    }

    pub fn with_duration(mut self, minutes: f64) -> Self {
        self.estimated_duration_minutes = Some(minutes);
        self
    }

    pub fn with_parallelism(mut self, parallelism: u32) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_hints(mut self, hints: ResourceHints) -> Self {
        self.resource_hints = Some(hints);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cost_ceiling(mut self, ceiling: f64) -> Self {
        self.cost_ceiling = Some(ceiling);
        self
    }
}

/// Effective requirements after merging the profile with request hints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    pub cores: u32,
    pub memory_gb: f64,
    pub duration_minutes: f64,
    pub parallelism: u32,
}

/// A resource class that satisfies the minimums, with its score for one request
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub class: ResourceClass,
    /// Average of requested/available cores and memory; 1.0 is a tight fit
    pub efficiency: f64,
    pub affine: bool,
    pub estimated_cost: f64,
    pub score: f64,
}

/// Direction of an alternate relative to the chosen class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlternateKind {
    /// Lower cost per minute; the cost-optimization alternate
    Cheaper,
    /// Strictly more cores; the performance-optimization alternate
    Faster,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternate {
    pub resource_class: String,
    pub kind: AlternateKind,
    pub cores: u32,
    pub cost_per_minute: f64,
    pub estimated_cost: f64,
    /// Alternate cost minus chosen cost; negative means savings
    pub cost_delta: f64,
    pub tradeoff: String,
}

/// Requested resources as a share of the chosen class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Utilization {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub overall_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HintKind {
    Downgrade,
    Upgrade,
    Parallelize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationHint {
    pub kind: HintKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// Final allocation for one request. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationDecision {
    pub workload_type: String,
    pub chosen_resource_class: String,
    pub alternates: Vec<Alternate>,
    pub estimated_cost: f64,
    /// False when no candidate fit the ceiling and the cheapest was taken
    pub within_budget: bool,
    pub utilization: Utilization,
    pub reasoning: Vec<String>,
    pub optimization_hints: Vec<OptimizationHint>,
}

impl AllocationDecision {
    pub fn alternate(&self, kind: AlternateKind) -> Option<&Alternate> {
        self.alternates.iter().find(|a| a.kind == kind)
    }
}

/// Snapshot of runner conditions supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveConditions {
    /// Current queue time in minutes per resource class
    #[serde(default)]
    pub queue_times: BTreeMap<String, f64>,
    /// Fraction of runners currently free, 0..=1, per resource class
    #[serde(default)]
    pub runner_availability: BTreeMap<String, f64>,
    /// Hour of day, 0..=23
    pub current_hour: u32,
}

impl LiveConditions {
    pub fn at_hour(current_hour: u32) -> Self {
        Self {
            current_hour,
            ..Default::default()
        }
    }

    pub fn with_queue_time(mut self, class: impl Into<String>, minutes: f64) -> Self {
        self.queue_times.insert(class.into(), minutes);
        self
    }

    pub fn with_availability(mut self, class: impl Into<String>, availability: f64) -> Self {
        self.runner_availability.insert(class.into(), availability);
        self
    }

    /// Missing entries are read as an empty queue
    pub fn queue_time(&self, class: &str) -> f64 {
        self.queue_times.get(class).copied().unwrap_or(0.0)
    }

    /// Missing entries are read as fully available
    pub fn availability(&self, class: &str) -> f64 {
        self.runner_availability.get(class).copied().unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceImpact {
    Improved,
    Minimal,
    None,
}

/// Which adjuster rule produced a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdjustmentRule {
    CriticalQueue,
    LowAvailability,
    PeakHours,
}

impl AdjustmentRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentRule::CriticalQueue => "critical-queue",
            AdjustmentRule::LowAvailability => "low-availability",
            AdjustmentRule::PeakHours => "peak-hours",
        }
    }
}

/// Live-condition override wrapped around a decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicAdjustment {
    pub original_runner: String,
    pub adjusted_runner: String,
    pub runner_changed: bool,
    pub reason: String,
    pub cost_delta: f64,
    pub performance_impact: PerformanceImpact,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<AdjustmentRule>,
}
